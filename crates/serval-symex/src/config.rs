use indexmap::IndexMap;
use serval_ir::program::LoopId;

/// Configuration of a symbolic execution run.
#[derive(Debug, Clone)]
pub struct SymexConfig {
    /// Maximum steps per path; 0 means unlimited.
    pub max_depth: u64,
    pub doing_path_exploration: bool,
    pub allow_pointer_unsoundness: bool,
    pub constant_propagation: bool,
    pub self_loops_to_assumptions: bool,
    pub simplify: bool,
    pub unwinding_assertions: bool,
    pub partial_loops: bool,
    pub debug_level: u32,
    /// Re-check level-2 renaming of the emitted equation.
    pub run_validation_checks: bool,
    /// Global loop/recursion unwind bound; `None` means unbounded.
    pub unwind: Option<u64>,
    /// Per-loop overrides keyed by the loop id's display form
    /// (`function.back_edge`) or, for recursion, the function name.
    pub unwind_set: IndexMap<String, u64>,
}

impl Default for SymexConfig {
    fn default() -> Self {
        SymexConfig {
            max_depth: 0,
            doing_path_exploration: false,
            allow_pointer_unsoundness: false,
            constant_propagation: true,
            self_loops_to_assumptions: false,
            simplify: true,
            unwinding_assertions: false,
            partial_loops: false,
            debug_level: 0,
            run_validation_checks: false,
            unwind: None,
            unwind_set: IndexMap::new(),
        }
    }
}

impl SymexConfig {
    /// The unwind bound that applies to a loop.
    pub fn loop_unwind_bound(&self, loop_id: &LoopId) -> Option<u64> {
        self.unwind_set
            .get(&loop_id.to_string())
            .copied()
            .or(self.unwind)
    }

    /// The unwind bound that applies to recursive calls of a function.
    pub fn recursion_unwind_bound(&self, function: &str) -> Option<u64> {
        self.unwind_set.get(function).copied().or(self.unwind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_loop_bounds_override_the_global_one() {
        let mut config = SymexConfig {
            unwind: Some(10),
            ..SymexConfig::default()
        };
        config.unwind_set.insert("f.3".to_string(), 2);

        let overridden = LoopId {
            function: "f".into(),
            back_edge: 3,
        };
        let plain = LoopId {
            function: "g".into(),
            back_edge: 7,
        };
        assert_eq!(config.loop_unwind_bound(&overridden), Some(2));
        assert_eq!(config.loop_unwind_bound(&plain), Some(10));
    }

    #[test]
    fn no_bound_means_unbounded() {
        let config = SymexConfig::default();
        let loop_id = LoopId {
            function: "f".into(),
            back_edge: 0,
        };
        assert_eq!(config.loop_unwind_bound(&loop_id), None);
        assert_eq!(config.recursion_unwind_bound("f"), None);
    }
}
