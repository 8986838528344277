//! Bidirectional mapping between variable names and wire topics.
//!
//! The router is built once from the registry and never mutated. Every
//! topic is precomputed, so outbound lookups are an index and inbound
//! classification is one hash lookup. Building the full table up front
//! is what makes topic collisions detectable before any stepping.

use std::collections::HashMap;
use std::sync::Arc;

use cosim_core::{Causality, LookupError, VarId, VariableRegistry};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// JSON key holding simulation time in the combined snapshot.
pub const TIME_KEY: &str = "t";

// ── TopicScheme ────────────────────────────────────────────────────

/// How variable names become topics.
///
/// A variable topic is `prefix + separator + name`, or the bare name when
/// the prefix is empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicScheme {
    /// Prefix for inbound input topics. Default: `input`.
    pub input_prefix: String,
    /// Prefix for outbound per-variable topics. Default: `output`.
    pub output_prefix: String,
    /// Joins prefix and name. Default: `/`.
    pub separator: String,
    /// Reserved inbound reset topic. Default: `reset`.
    pub reset: String,
    /// Reserved outbound combined-snapshot topic. Default: `output`.
    pub combined: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            input_prefix: "input".into(),
            output_prefix: "output".into(),
            separator: "/".into(),
            reset: "reset".into(),
            combined: "output".into(),
        }
    }
}

impl TopicScheme {
    fn compose(&self, prefix: &str, name: &str) -> String {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}{}{name}", self.separator)
        }
    }

    /// Topic carrying writes to input `name`.
    pub fn input_topic(&self, name: &str) -> String {
        self.compose(&self.input_prefix, name)
    }

    /// Topic carrying the value of output `name`.
    pub fn output_topic(&self, name: &str) -> String {
        self.compose(&self.output_prefix, name)
    }

    /// Check the scheme on its own, before any variable names are known.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reset.is_empty() {
            return Err(ConfigError::InvalidTopicScheme {
                reason: "reset topic is empty".into(),
            });
        }
        if self.combined.is_empty() {
            return Err(ConfigError::InvalidTopicScheme {
                reason: "combined output topic is empty".into(),
            });
        }
        if self.reset == self.combined {
            return Err(ConfigError::TopicCollision {
                topic: self.reset.clone(),
                first: "reset topic".into(),
                second: "combined output topic".into(),
            });
        }
        let prefixed = !self.input_prefix.is_empty() || !self.output_prefix.is_empty();
        if prefixed && self.separator.is_empty() {
            return Err(ConfigError::InvalidTopicScheme {
                reason: "separator is empty".into(),
            });
        }
        Ok(())
    }
}

// ── Route ──────────────────────────────────────────────────────────

/// Classification of a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Write to an input variable.
    Input(VarId),
    /// Per-variable value of an output.
    Output(VarId),
    /// Reinitialize the model.
    Reset,
    /// Combined snapshot of all outputs.
    CombinedOutput,
    /// No route; ignored.
    Unrecognized,
}

// ── TopicRouter ────────────────────────────────────────────────────

/// Precomputed topic table for one model.
#[derive(Debug)]
pub struct TopicRouter {
    registry: Arc<VariableRegistry>,
    scheme: TopicScheme,
    /// Topic per `VarId`; empty for parameters.
    topics: Vec<Vec<u8>>,
    routes: HashMap<Vec<u8>, Route>,
    subscriptions: Vec<Vec<u8>>,
}

impl TopicRouter {
    /// Build the table, failing on any collision.
    ///
    /// Checked pairs: variable against variable, variable against the
    /// reserved topics, and the reserved topics against each other. An
    /// output named [`TIME_KEY`] is also rejected because it would shadow
    /// the time field of the combined snapshot.
    pub fn new(registry: Arc<VariableRegistry>, scheme: TopicScheme) -> Result<Self, ConfigError> {
        scheme.validate()?;

        let mut owners: HashMap<Vec<u8>, String> = HashMap::new();
        let mut routes = HashMap::new();
        let mut claim = |topic: Vec<u8>, owner: String, route: Route| {
            if let Some(first) = owners.get(&topic) {
                return Err(ConfigError::TopicCollision {
                    topic: String::from_utf8_lossy(&topic).into_owned(),
                    first: first.clone(),
                    second: owner,
                });
            }
            owners.insert(topic.clone(), owner);
            routes.insert(topic, route);
            Ok(())
        };

        claim(
            scheme.reset.clone().into_bytes(),
            "reset topic".into(),
            Route::Reset,
        )?;
        claim(
            scheme.combined.clone().into_bytes(),
            "combined output topic".into(),
            Route::CombinedOutput,
        )?;

        let mut topics = vec![Vec::new(); registry.len()];
        let mut subscriptions = vec![scheme.reset.clone().into_bytes()];

        for (id, def) in registry.iter() {
            let (topic, route) = match def.causality {
                Causality::Input => (scheme.input_topic(&def.name), Route::Input(id)),
                Causality::Output => {
                    if def.name == TIME_KEY {
                        return Err(ConfigError::ReservedOutputName {
                            name: def.name.clone(),
                        });
                    }
                    (scheme.output_topic(&def.name), Route::Output(id))
                }
                Causality::Parameter => continue,
            };
            let topic = topic.into_bytes();
            claim(
                topic.clone(),
                format!("{} '{}'", def.causality, def.name),
                route,
            )?;
            if def.causality == Causality::Input {
                subscriptions.push(topic.clone());
            }
            topics[id.index()] = topic;
        }

        Ok(Self {
            registry,
            scheme,
            topics,
            routes,
            subscriptions,
        })
    }

    /// The registry this table was built from.
    pub fn registry(&self) -> &Arc<VariableRegistry> {
        &self.registry
    }

    /// The scheme this table was built with.
    pub fn scheme(&self) -> &TopicScheme {
        &self.scheme
    }

    /// Topic for writes to input `name`.
    pub fn topic_for_input(&self, name: &str) -> Result<&[u8], LookupError> {
        let id = self.registry.input(name)?;
        Ok(&self.topics[id.index()])
    }

    /// Topic for the value of output `name`.
    pub fn topic_for_output(&self, name: &str) -> Result<&[u8], LookupError> {
        let id = self.registry.output(name)?;
        Ok(&self.topics[id.index()])
    }

    /// Topic of an input or output handle. Empty for parameters.
    pub fn topic(&self, id: VarId) -> &[u8] {
        &self.topics[id.index()]
    }

    /// The reserved reset topic.
    pub fn reset_topic(&self) -> &[u8] {
        self.scheme.reset.as_bytes()
    }

    /// The reserved combined-snapshot topic.
    pub fn combined_topic(&self) -> &[u8] {
        self.scheme.combined.as_bytes()
    }

    /// Classify an inbound or outbound topic. Matching is exact.
    pub fn resolve(&self, topic: &[u8]) -> Route {
        self.routes
            .get(topic)
            .copied()
            .unwrap_or(Route::Unrecognized)
    }

    /// Topics the inbound subscriber must register: reset, then every
    /// input topic in registry order.
    pub fn subscriptions(&self) -> &[Vec<u8>] {
        &self.subscriptions
    }

    /// Variable name of a handle.
    pub fn name(&self, id: VarId) -> &str {
        self.registry.name(id)
    }

    /// Every route as `(topic, route)`, reserved topics first, then
    /// variables in registry order.
    pub fn table(&self) -> Vec<(String, Route)> {
        let mut rows = vec![
            (self.scheme.reset.clone(), Route::Reset),
            (self.scheme.combined.clone(), Route::CombinedOutput),
        ];
        for (id, def) in self.registry.iter() {
            if def.causality == Causality::Parameter {
                continue;
            }
            let topic = String::from_utf8_lossy(self.topic(id)).into_owned();
            let route = self.resolve(self.topic(id));
            rows.push((topic, route));
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_core::VariableDef;
    use proptest::prelude::*;

    fn registry(defs: Vec<VariableDef>) -> Arc<VariableRegistry> {
        Arc::new(VariableRegistry::build(defs).unwrap())
    }

    fn msd() -> Arc<VariableRegistry> {
        registry(vec![
            VariableDef::new("m", Causality::Parameter, 0),
            VariableDef::new("u", Causality::Input, 1),
            VariableDef::new("x", Causality::Output, 2),
            VariableDef::new("v", Causality::Output, 3),
        ])
    }

    #[test]
    fn default_scheme_topics() {
        let router = TopicRouter::new(msd(), TopicScheme::default()).unwrap();
        assert_eq!(router.topic_for_input("u").unwrap(), b"input/u");
        assert_eq!(router.topic_for_output("x").unwrap(), b"output/x");
        assert_eq!(router.reset_topic(), b"reset");
        assert_eq!(router.combined_topic(), b"output");
    }

    #[test]
    fn resolve_classifies_every_kind() {
        let reg = msd();
        let router = TopicRouter::new(Arc::clone(&reg), TopicScheme::default()).unwrap();
        assert_eq!(router.resolve(b"input/u"), Route::Input(reg.input("u").unwrap()));
        assert_eq!(router.resolve(b"output/v"), Route::Output(reg.output("v").unwrap()));
        assert_eq!(router.resolve(b"reset"), Route::Reset);
        assert_eq!(router.resolve(b"output"), Route::CombinedOutput);
        assert_eq!(router.resolve(b"input/m"), Route::Unrecognized);
        assert_eq!(router.resolve(b"input/u2"), Route::Unrecognized);
        assert_eq!(router.resolve(b""), Route::Unrecognized);
    }

    #[test]
    fn wrong_causality_is_unknown_variable() {
        let router = TopicRouter::new(msd(), TopicScheme::default()).unwrap();
        match router.topic_for_input("x") {
            Err(LookupError::UnknownVariable { name, expected }) => {
                assert_eq!(name, "x");
                assert_eq!(expected, Causality::Input);
            }
            other => panic!("expected UnknownVariable, got {other:?}"),
        }
        assert!(router.topic_for_output("m").is_err());
    }

    #[test]
    fn subscriptions_are_reset_then_inputs() {
        let reg = registry(vec![
            VariableDef::new("a", Causality::Input, 0),
            VariableDef::new("y", Causality::Output, 1),
            VariableDef::new("b", Causality::Input, 2),
        ]);
        let router = TopicRouter::new(reg, TopicScheme::default()).unwrap();
        let subs: Vec<&[u8]> = router.subscriptions().iter().map(Vec::as_slice).collect();
        assert_eq!(subs, [&b"reset"[..], b"input/a", b"input/b"]);
    }

    #[test]
    fn bare_names_collide_with_reserved_topic() {
        // Legacy layout: outputs published under their bare names.
        let scheme = TopicScheme {
            input_prefix: String::new(),
            output_prefix: String::new(),
            ..TopicScheme::default()
        };
        let reg = registry(vec![VariableDef::new("output", Causality::Output, 0)]);
        match TopicRouter::new(reg, scheme) {
            Err(ConfigError::TopicCollision {
                topic,
                first,
                second,
            }) => {
                assert_eq!(topic, "output");
                assert_eq!(first, "combined output topic");
                assert_eq!(second, "output 'output'");
            }
            other => panic!("expected TopicCollision, got {other:?}"),
        }
    }

    #[test]
    fn nested_names_can_collide_across_prefixes() {
        let scheme = TopicScheme {
            input_prefix: "a/b".into(),
            output_prefix: "a".into(),
            ..TopicScheme::default()
        };
        let reg = registry(vec![
            VariableDef::new("c", Causality::Input, 0),
            VariableDef::new("b/c", Causality::Output, 1),
        ]);
        match TopicRouter::new(reg, scheme) {
            Err(ConfigError::TopicCollision {
                topic,
                first,
                second,
            }) => {
                assert_eq!(topic, "a/b/c");
                assert_eq!(first, "input 'c'");
                assert_eq!(second, "output 'b/c'");
            }
            other => panic!("expected TopicCollision, got {other:?}"),
        }
    }

    #[test]
    fn input_named_like_reset_collides() {
        let scheme = TopicScheme {
            input_prefix: String::new(),
            ..TopicScheme::default()
        };
        let reg = registry(vec![VariableDef::new("reset", Causality::Input, 0)]);
        match TopicRouter::new(reg, scheme) {
            Err(ConfigError::TopicCollision { topic, .. }) => assert_eq!(topic, "reset"),
            other => panic!("expected TopicCollision, got {other:?}"),
        }
    }

    #[test]
    fn reserved_topics_must_differ() {
        let scheme = TopicScheme {
            reset: "ctl".into(),
            combined: "ctl".into(),
            ..TopicScheme::default()
        };
        match TopicRouter::new(msd(), scheme) {
            Err(ConfigError::TopicCollision { topic, .. }) => assert_eq!(topic, "ctl"),
            other => panic!("expected TopicCollision, got {other:?}"),
        }
    }

    #[test]
    fn output_named_t_is_reserved() {
        let reg = registry(vec![VariableDef::new("t", Causality::Output, 0)]);
        assert_eq!(
            TopicRouter::new(reg, TopicScheme::default()).unwrap_err(),
            ConfigError::ReservedOutputName { name: "t".into() }
        );
    }

    #[test]
    fn table_lists_reserved_then_variables() {
        let router = TopicRouter::new(msd(), TopicScheme::default()).unwrap();
        let topics: Vec<String> = router.table().into_iter().map(|(t, _)| t).collect();
        assert_eq!(topics, ["reset", "output", "input/u", "output/x", "output/v"]);
    }

    fn name_strategy() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,7}"
    }

    proptest! {
        #[test]
        fn every_variable_round_trips(
            names in proptest::collection::hash_set(name_strategy(), 1..12),
            split in 0usize..12,
        ) {
            let names: Vec<String> = names.into_iter().filter(|n| n != TIME_KEY).collect();
            prop_assume!(!names.is_empty());
            let defs = names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    let c = if i < split { Causality::Input } else { Causality::Output };
                    VariableDef::new(n.clone(), c, i as u32)
                })
                .collect();
            let reg = registry(defs);
            let router = TopicRouter::new(Arc::clone(&reg), TopicScheme::default()).unwrap();

            for &id in reg.inputs() {
                let topic = router.topic_for_input(reg.name(id)).unwrap();
                prop_assert_eq!(router.resolve(topic), Route::Input(id));
            }
            for &id in reg.outputs() {
                let topic = router.topic_for_output(reg.name(id)).unwrap();
                prop_assert_eq!(router.resolve(topic), Route::Output(id));
            }
        }
    }
}
