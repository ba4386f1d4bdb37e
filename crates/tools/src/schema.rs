//! The procurement tool registry.
//!
//! Each tool's argument schema is declared exactly once; the validator and
//! the definitions advertised to the model both render from the same
//! declaration, so they cannot drift apart.

use pf_domain::chat::ToolDefinition;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Declarations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
pub enum ParamKind {
    Str {
        min_len: usize,
        max_len: usize,
    },
    Int {
        min: i64,
        max: i64,
    },
    Num {
        min: f64,
        /// When true, values equal to `min` are rejected.
        exclusive_min: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: ParamKind,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    /// Whether the call must carry an authenticated user.
    pub requires_user: bool,
}

pub const SEARCH_CATALOG: ToolSpec = ToolSpec {
    name: "search_catalog",
    description: "Search the procurement catalog for items matching a query. \
                  Returns matching items with prices and availability.",
    params: &[
        ParamSpec {
            name: "query",
            required: true,
            kind: ParamKind::Str { min_len: 1, max_len: 500 },
            description: "Search terms, e.g. 'wireless mouse'",
        },
        ParamSpec {
            name: "limit",
            required: false,
            kind: ParamKind::Int { min: 1, max: 50 },
            description: "Maximum number of items to return (default 10)",
        },
        ParamSpec {
            name: "maxPrice",
            required: false,
            kind: ParamKind::Num { min: 0.0, exclusive_min: true },
            description: "Only return items priced at or below this",
        },
        ParamSpec {
            name: "minPrice",
            required: false,
            kind: ParamKind::Num { min: 0.0, exclusive_min: false },
            description: "Only return items priced at or above this",
        },
    ],
    requires_user: false,
};

pub const ADD_TO_CART: ToolSpec = ToolSpec {
    name: "add_to_cart",
    description: "Add a catalog item to the user's cart.",
    params: &[
        ParamSpec {
            name: "itemId",
            required: true,
            kind: ParamKind::Str { min_len: 1, max_len: 200 },
            description: "Catalog id of the item to add",
        },
        ParamSpec {
            name: "quantity",
            required: false,
            kind: ParamKind::Int { min: 1, max: 1000 },
            description: "How many to add (default 1)",
        },
    ],
    requires_user: true,
};

pub const REMOVE_FROM_CART: ToolSpec = ToolSpec {
    name: "remove_from_cart",
    description: "Remove an item from the user's cart.",
    params: &[ParamSpec {
        name: "itemId",
        required: true,
        kind: ParamKind::Str { min_len: 1, max_len: 200 },
        description: "Catalog id of the item to remove",
    }],
    requires_user: true,
};

pub const GET_CART: ToolSpec = ToolSpec {
    name: "get_cart",
    description: "Get the current contents of the user's cart.",
    params: &[],
    requires_user: true,
};

pub const CHECKOUT: ToolSpec = ToolSpec {
    name: "checkout",
    description: "Convert the user's cart into a purchase request for approval.",
    params: &[ParamSpec {
        name: "notes",
        required: false,
        kind: ParamKind::Str { min_len: 0, max_len: 2000 },
        description: "Optional notes for the approver",
    }],
    requires_user: true,
};

pub const ALL: &[&ToolSpec] = &[
    &SEARCH_CATALOG,
    &ADD_TO_CART,
    &REMOVE_FROM_CART,
    &GET_CART,
    &CHECKOUT,
];

/// Look up a registered tool by name.
pub fn spec_for(name: &str) -> Option<&'static ToolSpec> {
    ALL.iter().find(|spec| spec.name == name).copied()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendering the advertised definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render all tool definitions for the model, from the same declarations
/// the validator consumes.
pub fn definitions() -> Vec<ToolDefinition> {
    ALL.iter().map(|spec| definition(spec)).collect()
}

fn definition(spec: &ToolSpec) -> ToolDefinition {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<Value> = Vec::new();

    for param in spec.params {
        properties.insert(param.name.to_string(), param_schema(param));
        if param.required {
            required.push(Value::String(param.name.to_string()));
        }
    }

    ToolDefinition {
        name: spec.name.to_string(),
        description: spec.description.to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

fn param_schema(param: &ParamSpec) -> Value {
    match param.kind {
        ParamKind::Str { min_len, max_len } => serde_json::json!({
            "type": "string",
            "minLength": min_len,
            "maxLength": max_len,
            "description": param.description,
        }),
        ParamKind::Int { min, max } => serde_json::json!({
            "type": "integer",
            "minimum": min,
            "maximum": max,
            "description": param.description,
        }),
        ParamKind::Num { min, exclusive_min } => {
            if exclusive_min {
                serde_json::json!({
                    "type": "number",
                    "exclusiveMinimum": min,
                    "description": param.description,
                })
            } else {
                serde_json::json!({
                    "type": "number",
                    "minimum": min,
                    "description": param.description,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_five_tools_are_registered() {
        let names: Vec<_> = ALL.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["search_catalog", "add_to_cart", "remove_from_cart", "get_cart", "checkout"]
        );
    }

    #[test]
    fn auth_requirements_match_tool_kinds() {
        assert!(!SEARCH_CATALOG.requires_user);
        for spec in [&ADD_TO_CART, &REMOVE_FROM_CART, &GET_CART, &CHECKOUT] {
            assert!(spec.requires_user, "{} must require a user", spec.name);
        }
    }

    #[test]
    fn definitions_render_required_and_bounds() {
        let defs = definitions();
        let search = defs.iter().find(|d| d.name == "search_catalog").unwrap();
        assert_eq!(search.parameters["required"][0], "query");
        assert_eq!(search.parameters["properties"]["query"]["maxLength"], 500);
        assert_eq!(search.parameters["properties"]["limit"]["minimum"], 1);
        assert_eq!(search.parameters["properties"]["limit"]["maximum"], 50);
        assert_eq!(
            search.parameters["properties"]["maxPrice"]["exclusiveMinimum"],
            0.0
        );

        let add = defs.iter().find(|d| d.name == "add_to_cart").unwrap();
        assert_eq!(add.parameters["properties"]["quantity"]["maximum"], 1000);

        let get_cart = defs.iter().find(|d| d.name == "get_cart").unwrap();
        assert_eq!(
            get_cart.parameters["required"].as_array().unwrap().len(),
            0
        );
    }

    #[test]
    fn spec_lookup() {
        assert!(spec_for("checkout").is_some());
        assert!(spec_for("drop_tables").is_none());
    }
}
