//! Runtime configuration (`spec.md` §6 / `SPEC_FULL.md` §4.12), built with a
//! `ocl::ProQueBuilder`-style explicit builder rather than reading the
//! environment directly.

/// Tunables read once by the host application and threaded down into
/// `rt_vm::Instance` at construction.
#[derive(Debug, Clone)]
pub struct Config {
    max_stack_depth: usize,
    tracing_enabled: bool,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }
}

impl Default for Config {
    fn default() -> Config {
        Config { max_stack_depth: 256, tracing_enabled: false }
    }
}

/// Builder mirroring `ocl::ProQueBuilder`: explicit fields, no environment
/// coupling (the one operator-facing flag named in `spec.md` §6 is read by
/// the host application and passed in via [`ConfigBuilder::tracing_enabled`],
/// never read here).
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    max_stack_depth: Option<usize>,
    tracing_enabled: Option<bool>,
}

impl ConfigBuilder {
    pub fn max_stack_depth(mut self, depth: usize) -> ConfigBuilder {
        self.max_stack_depth = Some(depth);
        self
    }

    pub fn tracing_enabled(mut self, enabled: bool) -> ConfigBuilder {
        self.tracing_enabled = Some(enabled);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            max_stack_depth: self.max_stack_depth.unwrap_or(defaults.max_stack_depth),
            tracing_enabled: self.tracing_enabled.unwrap_or(defaults.tracing_enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_supplemented_constants() {
        let config = Config::default();
        assert_eq!(config.max_stack_depth(), 256);
        assert!(!config.tracing_enabled());
    }

    #[test]
    fn builder_overrides_only_what_is_set() {
        let config = Config::builder().max_stack_depth(16).build();
        assert_eq!(config.max_stack_depth(), 16);
        assert!(!config.tracing_enabled());
    }
}
