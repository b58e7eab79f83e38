use crate::compiler::plan::FieldPlan;
use crate::compiler::plan::Schedule;
use crate::configuration::Jit;

/// Where a selection set sits in the operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Level {
    /// Number of fields above this selection set.
    pub(crate) depth: usize,
    /// Root selection set of a mutation.
    pub(crate) serial_root: bool,
}

/// Picks how the fields of a selection set run, from whether they await.
///
/// Nothing is decided at runtime: a selection set with no awaiting field never
/// suspends, and past `max_parallel_depth` awaiting fields run one after the
/// other.
pub(crate) fn schedule(fields: &[FieldPlan], level: Level, jit: &Jit) -> Schedule {
    if level.serial_root {
        return if fields.iter().any(FieldPlan::awaits) {
            Schedule::Serial
        } else {
            Schedule::Sync
        };
    }
    match fields.iter().filter(|field| field.awaits()).count() {
        0 => Schedule::Sync,
        _ if !concurrent(level, jit) => Schedule::Serial,
        // a single awaiting field has nothing to overlap with
        1 => Schedule::Serial,
        _ => Schedule::Concurrent,
    }
}

/// Whether awaiting items of a list at this level are started together.
pub(crate) fn concurrent(level: Level, jit: &Jit) -> bool {
    jit.parallel && level.depth <= jit.max_parallel_depth
}
