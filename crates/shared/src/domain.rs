use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

id_newtype!(EffectId, "effect");
id_newtype!(DispatchId, "dispatch");

/// What a bookkeeping entry in the orchestrator stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Perform,
    Observe,
    /// Aggregate over the units spawned by one dispatch.
    Composite,
}

impl EffectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Perform => "perform",
            EffectKind::Observe => "observe",
            EffectKind::Composite => "composite",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_with_prefix() {
        assert_eq!(EffectId(7).to_string(), "effect-7");
        assert_eq!(DispatchId(3).to_string(), "dispatch-3");
    }

    #[test]
    fn effect_kind_serializes_snake_case() {
        let encoded = serde_json::to_string(&EffectKind::Composite).expect("encode");
        assert_eq!(encoded, "\"composite\"");
        assert_eq!(EffectKind::Observe.as_str(), "observe");
    }
}
