//! The runtime-support contract (§1 "THE CORE": "garbage-collected
//! allocation, mark-and-sweep and mark-compact ... collectors, and a
//! stack-map-driven root iterator"; §5 "Runtime (generated-code)
//! concurrency"; §6 object layout and linker-visible entry points).
//!
//! What generated code actually links against — the MIPS/C runtime
//! glue that turns these algorithms into machine instructions — is
//! explicitly out of core scope (§1). What lives here is the algorithm
//! layer itself: a byte-addressable [`heap::Heap`] with the exact
//! header layout of §6, an allocator, a marker, all four collectors
//! named in §5, and the stack map / stack walker of §3 and §5 — all
//! directly testable (§8 "GC preservation", "Round-trip") without a
//! real machine-code target.

pub mod alloc;
pub mod collect;
pub mod entry;
pub mod heap;
pub mod mark;
pub mod object;
pub mod stackmap;

pub use collect::GCAlgo;

/// The generated program's argv contract (§6 "Runtime argv"). Every
/// flag here governs a real Rust-visible behavior of this module — the
/// boolean trace flags are read by `Heap`/collector call sites that
/// choose to log (none of this module panics or changes semantics
/// based on them) — so a consumer wiring this crate up to an actual
/// emitted runtime can route its own tracing through the same struct.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub max_heap_size: usize,
    pub gc_algo: GCAlgo,
    pub print_gc_statistics: bool,
    pub print_allocated_objects: bool,
    pub trace_marking: bool,
    pub trace_stack_slot_update: bool,
    pub trace_object_field_update: bool,
    pub trace_object_moving: bool,
    pub trace_gc_cycles: bool,
    pub print_stack_maps: bool,
    pub trace_stack_walker: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_heap_size: 1 << 20,
            gc_algo: GCAlgo::MarkSweep,
            print_gc_statistics: false,
            print_allocated_objects: false,
            trace_marking: false,
            trace_stack_slot_update: false,
            trace_object_field_update: false,
            trace_object_moving: false,
            trace_gc_cycles: false,
            print_stack_maps: false,
            trace_stack_walker: false,
        }
    }
}

/// Parses the generated program's argv (§6): `+flag`/`-flag` booleans
/// and `name=value` for `MaxHeapSize`/`GCAlgo`. Unrecognized tokens are
/// ignored, mirroring the compiler driver's own "unknown flags are
/// silently ignored" policy (§6 CLI) — there is no separate spec for
/// this argv's error behavior, and symmetry with the driver is the
/// least surprising default.
pub fn parse_runtime_argv(args: &[String]) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    for arg in args {
        if let Some(flag) = arg.strip_prefix('+') {
            set_flag(&mut config, flag, true);
        } else if let Some(flag) = arg.strip_prefix('-') {
            set_flag(&mut config, flag, false);
        } else if let Some((name, value)) = arg.split_once('=') {
            match name {
                "MaxHeapSize" => {
                    if let Ok(n) = value.parse() {
                        config.max_heap_size = n;
                    }
                }
                "GCAlgo" => {
                    if let Ok(n) = value.parse::<u32>() {
                        if let Some(algo) = GCAlgo::from_index(n) {
                            config.gc_algo = algo;
                        }
                    }
                }
                _ => {}
            }
        }
    }
    config
}

fn set_flag(config: &mut RuntimeConfig, flag: &str, value: bool) {
    match flag {
        "PrintGCStatistics" => config.print_gc_statistics = value,
        "PrintAllocatedObjects" => config.print_allocated_objects = value,
        "TraceMarking" => config.trace_marking = value,
        "TraceStackSlotUpdate" => config.trace_stack_slot_update = value,
        "TraceObjectFieldUpdate" => config.trace_object_field_update = value,
        "TraceObjectMoving" => config.trace_object_moving = value,
        "TraceGCCycles" => config.trace_gc_cycles = value,
        "PrintStackMaps" => config.print_stack_maps = value,
        "TraceStackWalker" => config.trace_stack_walker = value,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_mark_sweep() {
        assert_eq!(RuntimeConfig::default().gc_algo, GCAlgo::MarkSweep);
    }

    #[test]
    fn test_plus_flag_enables_and_minus_flag_disables() {
        let config = parse_runtime_argv(&["+PrintGCStatistics".to_string()]);
        assert!(config.print_gc_statistics);
        let config = parse_runtime_argv(&["+PrintGCStatistics".to_string(), "-PrintGCStatistics".to_string()]);
        assert!(!config.print_gc_statistics);
    }

    #[test]
    fn test_name_value_pairs_set_heap_size_and_algo() {
        let config = parse_runtime_argv(&["MaxHeapSize=4096".to_string(), "GCAlgo=4".to_string()]);
        assert_eq!(config.max_heap_size, 4096);
        assert_eq!(config.gc_algo, GCAlgo::SemispaceCopying);
    }

    #[test]
    fn test_unknown_tokens_are_ignored() {
        let config = parse_runtime_argv(&["+NotARealFlag".to_string(), "Bogus=1".to_string()]);
        assert_eq!(config.max_heap_size, RuntimeConfig::default().max_heap_size);
    }
}
