// ── Control verb recipes ──
//
// Each verb maps to a fixed recipe per generation. The table is data the
// engine walks; adding a verb means adding a table entry, not engine code.
// `$name` strings in query values and RPC params are substituted from the
// caller's arguments.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::catalog::CapabilityDefinition;

// ── Control profile ─────────────────────────────────────────────────

/// Which output family a device drives. Chooses `relay/0` vs `light/0`
/// on Gen1 and `Switch.*` vs `Light.*` vs `Cover.*` on Gen2+.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlProfile {
    Relay,
    Light,
    Cover,
}

impl ControlProfile {
    /// Infer the profile from a capability definition's observed surface.
    pub fn from_definition(definition: &CapabilityDefinition) -> Self {
        let has = |needle: &str| {
            definition.apis.keys().any(|api| api.contains(needle))
                || definition
                    .parameters
                    .values()
                    .any(|p| p.api.contains(needle) || p.component.as_deref() == Some(needle))
        };
        if has("roller") || has("Cover") || has("cover:0") {
            Self::Cover
        } else if has("light") || has("Light") {
            Self::Light
        } else {
            Self::Relay
        }
    }

    /// Gen1 control channel for this profile.
    pub fn gen1_channel(&self) -> &'static str {
        match self {
            Self::Relay => "relay/0",
            Self::Light => "light/0",
            Self::Cover => "roller/0",
        }
    }
}

// ── Recipes ─────────────────────────────────────────────────────────

/// Gen1 side of a verb: a REST endpoint plus query pairs.
#[derive(Debug, Clone)]
pub struct Gen1Recipe {
    pub endpoint: Gen1Endpoint,
    /// Query pairs; values starting with `$` are argument placeholders.
    pub query: Vec<(&'static str, &'static str)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gen1Endpoint {
    /// The profile's control channel (`relay/0`, `light/0`, `roller/0`).
    Channel,
    Fixed(&'static str),
}

/// Gen2+ side of a verb: method and params per profile. A missing
/// profile entry falls back to the relay recipe.
#[derive(Debug, Clone)]
pub struct RpcRecipe {
    pub relay: (&'static str, Value),
    pub light: Option<(&'static str, Value)>,
    pub cover: Option<(&'static str, Value)>,
}

impl RpcRecipe {
    pub fn for_profile(&self, profile: ControlProfile) -> (&'static str, Value) {
        let (method, params) = match profile {
            ControlProfile::Relay => &self.relay,
            ControlProfile::Light => self.light.as_ref().unwrap_or(&self.relay),
            ControlProfile::Cover => self.cover.as_ref().unwrap_or(&self.relay),
        };
        (*method, params.clone())
    }
}

#[derive(Debug, Clone)]
pub struct VerbRecipe {
    pub gen1: Gen1Recipe,
    pub rpc: RpcRecipe,
}

impl VerbRecipe {
    /// Argument names this recipe requires, across both dialects and all
    /// profiles. Used for contract validation before any fan-out.
    pub fn required_args(&self) -> std::collections::BTreeSet<String> {
        let mut names = std::collections::BTreeSet::new();
        for (_, value) in &self.gen1.query {
            if let Some(name) = value.strip_prefix('$') {
                names.insert(name.to_string());
            }
        }
        let mut scan = |params: &Value| collect_placeholders(params, &mut names);
        scan(&self.rpc.relay.1);
        if let Some((_, params)) = &self.rpc.light {
            scan(params);
        }
        if let Some((_, params)) = &self.rpc.cover {
            scan(params);
        }
        names
    }
}

fn collect_placeholders(value: &Value, out: &mut std::collections::BTreeSet<String>) {
    match value {
        Value::String(s) => {
            if let Some(name) = s.strip_prefix('$') {
                out.insert(name.to_string());
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_placeholders(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_placeholders(v, out);
            }
        }
        _ => {}
    }
}

// ── Table ───────────────────────────────────────────────────────────

/// The verb table. Lives next to the catalogue conceptually: extensible
/// data, not engine control flow.
pub struct VerbTable {
    recipes: BTreeMap<&'static str, VerbRecipe>,
}

impl Default for VerbTable {
    fn default() -> Self {
        let mut recipes = BTreeMap::new();

        recipes.insert(
            "on",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Channel,
                    query: vec![("turn", "on")],
                },
                rpc: RpcRecipe {
                    relay: ("Switch.Set", json!({ "id": 0, "on": true })),
                    light: Some(("Light.Set", json!({ "id": 0, "on": true }))),
                    cover: Some(("Cover.Open", json!({ "id": 0 }))),
                },
            },
        );

        recipes.insert(
            "off",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Channel,
                    query: vec![("turn", "off")],
                },
                rpc: RpcRecipe {
                    relay: ("Switch.Set", json!({ "id": 0, "on": false })),
                    light: Some(("Light.Set", json!({ "id": 0, "on": false }))),
                    cover: Some(("Cover.Close", json!({ "id": 0 }))),
                },
            },
        );

        recipes.insert(
            "toggle",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Channel,
                    query: vec![("turn", "toggle")],
                },
                rpc: RpcRecipe {
                    relay: ("Switch.Toggle", json!({ "id": 0 })),
                    light: Some(("Light.Toggle", json!({ "id": 0 }))),
                    cover: None,
                },
            },
        );

        recipes.insert(
            "brightness",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Channel,
                    query: vec![("brightness", "$brightness")],
                },
                rpc: RpcRecipe {
                    relay: ("Light.Set", json!({ "id": 0, "brightness": "$brightness" })),
                    light: Some(("Light.Set", json!({ "id": 0, "brightness": "$brightness" }))),
                    cover: None,
                },
            },
        );

        recipes.insert(
            "status",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Fixed("status"),
                    query: vec![],
                },
                rpc: RpcRecipe {
                    relay: ("Shelly.GetStatus", json!({})),
                    light: None,
                    cover: None,
                },
            },
        );

        recipes.insert(
            "reboot",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Fixed("reboot"),
                    query: vec![],
                },
                rpc: RpcRecipe {
                    relay: ("Shelly.Reboot", json!({})),
                    light: None,
                    cover: None,
                },
            },
        );

        // check_updates reads status; the engine extracts the update flag.
        recipes.insert(
            "check_updates",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Fixed("status"),
                    query: vec![],
                },
                rpc: RpcRecipe {
                    relay: ("Shelly.GetStatus", json!({})),
                    light: None,
                    cover: None,
                },
            },
        );

        recipes.insert(
            "update_firmware",
            VerbRecipe {
                gen1: Gen1Recipe {
                    endpoint: Gen1Endpoint::Fixed("ota"),
                    query: vec![("update", "true")],
                },
                rpc: RpcRecipe {
                    relay: ("Shelly.Update", json!({ "stage": "stable" })),
                    light: None,
                    cover: None,
                },
            },
        );

        Self { recipes }
    }
}

impl VerbTable {
    pub fn get(&self, verb: &str) -> Option<&VerbRecipe> {
        self.recipes.get(verb)
    }

    pub fn verbs(&self) -> Vec<&'static str> {
        self.recipes.keys().copied().collect()
    }
}

// ── Argument substitution ───────────────────────────────────────────

/// Replace `$name` placeholders with caller arguments. A placeholder
/// without a matching argument is an error the engine maps to a
/// validation failure.
pub fn substitute_params(
    template: &Value,
    args: &BTreeMap<String, Value>,
) -> Result<Value, String> {
    match template {
        Value::String(s) => {
            if let Some(name) = s.strip_prefix('$') {
                args.get(name)
                    .cloned()
                    .ok_or_else(|| format!("missing argument '{name}'"))
            } else {
                Ok(template.clone())
            }
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), substitute_params(v, args)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| substitute_params(v, args))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Substitute into Gen1 query pairs, rendering argument values as query
/// strings.
pub fn substitute_query(
    query: &[(&'static str, &'static str)],
    args: &BTreeMap<String, Value>,
) -> Result<Vec<(String, String)>, String> {
    query
        .iter()
        .map(|(key, value)| {
            let rendered = if let Some(name) = value.strip_prefix('$') {
                let arg = args
                    .get(name)
                    .ok_or_else(|| format!("missing argument '{name}'"))?;
                super::coerce::encode_gen1(arg)
            } else {
                (*value).to_string()
            };
            Ok(((*key).to_string(), rendered))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ApiDescriptor, ParamType, ParameterDescriptor, ResponseStructure};
    use crate::model::DeviceGeneration;

    #[test]
    fn default_table_covers_the_verb_set() {
        let table = VerbTable::default();
        for verb in [
            "on",
            "off",
            "toggle",
            "brightness",
            "status",
            "reboot",
            "check_updates",
            "update_firmware",
        ] {
            assert!(table.get(verb).is_some(), "missing verb {verb}");
        }
        assert!(table.get("self_destruct").is_none());
    }

    #[test]
    fn profile_inference() {
        let mut def = CapabilityDefinition::new("SHDM-2", "Dimmer", DeviceGeneration::Gen1);
        def.apis.insert(
            "settings/light/0".into(),
            ApiDescriptor {
                description: String::new(),
                response_structure: ResponseStructure::Leaf("...".into()),
            },
        );
        assert_eq!(
            ControlProfile::from_definition(&def),
            ControlProfile::Light
        );

        let mut cover = CapabilityDefinition::new("Plus2PM", "Cover", DeviceGeneration::Gen2);
        cover.parameters.insert(
            "cover:0.maxtime_open".into(),
            {
                let mut d =
                    ParameterDescriptor::new(ParamType::Float, "Cover.SetConfig", "maxtime_open");
                d.component = Some("cover:0".into());
                d
            },
        );
        assert_eq!(
            ControlProfile::from_definition(&cover),
            ControlProfile::Cover
        );

        let bare = CapabilityDefinition::new("SHSW-1", "Shelly 1", DeviceGeneration::Gen1);
        assert_eq!(ControlProfile::from_definition(&bare), ControlProfile::Relay);
    }

    #[test]
    fn substitution_fills_brightness() {
        let mut args = BTreeMap::new();
        args.insert("brightness".to_string(), serde_json::json!(70));

        let table = VerbTable::default();
        let recipe = table.get("brightness").unwrap();

        let (method, params) = recipe.rpc.for_profile(ControlProfile::Light);
        let params = substitute_params(&params, &args).unwrap();
        assert_eq!(method, "Light.Set");
        assert_eq!(params, serde_json::json!({ "id": 0, "brightness": 70 }));

        let query = substitute_query(&recipe.gen1.query, &args).unwrap();
        assert_eq!(query, vec![("brightness".to_string(), "70".to_string())]);
    }

    #[test]
    fn substitution_reports_missing_argument() {
        let table = VerbTable::default();
        let recipe = table.get("brightness").unwrap();
        let err = substitute_query(&recipe.gen1.query, &BTreeMap::new()).unwrap_err();
        assert!(err.contains("brightness"));
    }
}
