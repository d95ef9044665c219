use thiserror::Error;

/// SMT-LIB solver family for the `smt2` back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtSolverFamily {
    #[default]
    Generic,
    Boolector,
    Cvc3,
    Cvc4,
    Mathsat,
    Yices,
    Z3,
    CproverSmt2,
}

/// When to treat arrays as uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArraysUf {
    Never,
    #[default]
    Auto,
    Always,
}

/// Everything the façade reads when constructing a solver.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub dimacs: bool,
    pub refine: bool,
    pub refine_strings: bool,
    pub refine_arrays: bool,
    pub refine_arithmetic: bool,
    pub max_node_refinement: Option<u32>,
    pub smt2: bool,
    pub fpa: bool,
    pub solver_family: SmtSolverFamily,
    /// Destination for dump back ends; "-" means stdout.
    pub outfile: Option<String>,
    pub beautify: bool,
    pub sat_preprocessor: bool,
    pub arrays_uf: ArraysUf,
    /// Seconds; `None` or zero means no limit.
    pub solver_time_limit: Option<u64>,
    pub all_properties: bool,
    pub cover: bool,
    pub incremental_check: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            dimacs: false,
            refine: false,
            refine_strings: false,
            refine_arrays: false,
            refine_arithmetic: false,
            max_node_refinement: None,
            smt2: false,
            fpa: false,
            solver_family: SmtSolverFamily::default(),
            outfile: None,
            beautify: false,
            sat_preprocessor: true,
            arrays_uf: ArraysUf::default(),
            solver_time_limit: None,
            all_properties: false,
            cover: false,
            incremental_check: false,
        }
    }
}

/// Rejected option combinations, reported at construction time.
#[derive(Debug, Error)]
pub enum SolverConfigError {
    #[error("the chosen solver does not support beautification")]
    BeautifyUnsupported,
    #[error("the chosen solver does not support incremental solving (--{0})")]
    IncrementalUnsupported(&'static str),
    #[error("the generic SMT-LIB back end requires an output file")]
    MissingOutfile,
    #[error("failed to open output file `{path}`: {source}")]
    OutputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_the_sat_preprocessor() {
        let config = SolverConfig::default();
        assert!(config.sat_preprocessor);
        assert!(!config.dimacs);
        assert_eq!(config.solver_family, SmtSolverFamily::Generic);
        assert_eq!(config.arrays_uf, ArraysUf::Auto);
    }
}
