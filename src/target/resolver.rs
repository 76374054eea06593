use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::classifier::{ErrorPolicy, classify};
use crate::config::{ConfigProvider, ServerConfig};
use crate::output::Output;
use crate::server::{Server, ServerFactory};

pub const ALL_TARGETS: &str = "all";

/// A configured target bound to its execution collaborator.
pub struct Target {
    pub config: ServerConfig,
    pub server: Box<dyn Server>,
}

impl Target {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target").field("config", &self.config).finish()
    }
}

#[derive(Debug)]
pub enum ResolvedTarget {
    Known(Target),

    /// Requested by name but not configured
    Unknown,
}

/// Resolved targets keyed (and therefore ordered) by name.
pub type TargetMap = BTreeMap<String, ResolvedTarget>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRequest {
    All,
    Named(Vec<String>),
}

impl TargetRequest {
    /// `all` as first name selects every configured target.
    pub fn from_names(names: &[String]) -> Self {
        match names.first() {
            None => TargetRequest::All,
            Some(first) if first == ALL_TARGETS => TargetRequest::All,
            Some(_) => TargetRequest::Named(names.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Leave out inactive targets when expanding `all`
    pub skip_inactive: bool,

    /// Leave out disabled targets when expanding `all`
    pub skip_disabled: bool,

    /// Give up when global conflicts exist
    pub on_error_stop: bool,

    /// Do not report global conflicts
    pub suppress_errors: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            skip_inactive: false,
            skip_disabled: false,
            on_error_stop: true,
            suppress_errors: false,
        }
    }
}

#[derive(Debug)]
pub enum SingleTarget {
    Ready(Target),
    Unknown,

    /// Already reported, nothing left to do
    Aborted,
}

pub struct TargetResolver<'a> {
    config: &'a dyn ConfigProvider,
    factory: &'a dyn ServerFactory,
}

impl<'a> TargetResolver<'a> {
    pub fn new(config: &'a dyn ConfigProvider, factory: &'a dyn ServerFactory) -> Self {
        Self { config, factory }
    }

    fn instantiate(&self, config: ServerConfig) -> Target {
        let server = self.factory.create(&config);
        Target { config, server }
    }

    /// Expands a request into targets.
    ///
    /// Returns `None` when global conflicts stopped the resolution; they have
    /// been reported unless `suppress_errors` is set.
    pub fn resolve(
        &self,
        request: &TargetRequest,
        options: ResolveOptions,
        out: &mut dyn Output,
    ) -> Option<TargetMap> {
        let conflicts = self.config.global_conflicts();
        if !conflicts.is_empty() {
            if !options.suppress_errors {
                conflicts.iter().for_each(|c| out.error(c));
            }
            if options.on_error_stop {
                return None;
            }
        }

        let mut targets = TargetMap::new();
        match request {
            TargetRequest::All => {
                for config in self.config.servers() {
                    if options.skip_inactive && !config.active {
                        out.info(&format!("Skipping inactive server '{}'", config.name));
                        continue;
                    }
                    if options.skip_disabled && config.disabled() {
                        out.info(&format!(
                            "Skipping temporarily disabled server '{}'",
                            config.name
                        ));
                        continue;
                    }
                    let name = config.name.clone();
                    targets.insert(name, ResolvedTarget::Known(self.instantiate(config)));
                }
            }
            TargetRequest::Named(names) => {
                for name in names {
                    let resolved = match self.config.get_server(name) {
                        Some(config) => ResolvedTarget::Known(self.instantiate(config)),
                        None => ResolvedTarget::Unknown,
                    };
                    targets.insert(name.clone(), resolved);
                }
            }
        }

        debug!("resolved {} target(s)", targets.len());
        Some(targets)
    }

    /// Looks up a single target for commands that act on one backup.
    ///
    /// Global conflicts are always reported and always stop the command.
    pub fn resolve_one(&self, name: &str, policy: ErrorPolicy, out: &mut dyn Output) -> SingleTarget {
        let conflicts = self.config.global_conflicts();
        if !conflicts.is_empty() {
            conflicts.iter().for_each(|c| out.error(c));
            return SingleTarget::Aborted;
        }

        let Some(config) = self.config.get_server(name) else {
            return SingleTarget::Unknown;
        };
        if !classify(&config, policy).report(out) {
            return SingleTarget::Aborted;
        }
        SingleTarget::Ready(self.instantiate(config))
    }
}
