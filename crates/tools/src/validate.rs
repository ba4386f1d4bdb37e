//! Declarative tool-argument validation.
//!
//! Failures are values, not errors: the executor feeds them back to the
//! model as a structured payload so it can correct itself and retry.

use serde::Serialize;
use serde_json::Value;

use crate::schema::{ParamKind, ToolSpec};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

/// Validate `args` against a tool's declared schema, including the
/// cross-field price-range rule. Unknown fields are ignored.
pub fn validate_args(spec: &ToolSpec, args: &Value) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let object = match args {
        Value::Object(map) => map,
        Value::Null => {
            // No arguments at all: only valid when nothing is required.
            for param in spec.params.iter().filter(|p| p.required) {
                issues.push(ValidationIssue {
                    field: param.name.to_string(),
                    message: "required field is missing".into(),
                });
            }
            return if issues.is_empty() { Ok(()) } else { Err(issues) };
        }
        _ => {
            return Err(vec![ValidationIssue {
                field: "".into(),
                message: "arguments must be a JSON object".into(),
            }]);
        }
    };

    for param in spec.params {
        let value = match object.get(param.name) {
            Some(Value::Null) | None => {
                if param.required {
                    issues.push(ValidationIssue {
                        field: param.name.to_string(),
                        message: "required field is missing".into(),
                    });
                }
                continue;
            }
            Some(v) => v,
        };
        check_kind(param.name, &param.kind, value, &mut issues);
    }

    // Cross-field rule: when both bounds are present, the range must be
    // non-empty.
    if let (Some(min), Some(max)) = (
        object.get("minPrice").and_then(Value::as_f64),
        object.get("maxPrice").and_then(Value::as_f64),
    ) {
        if min > max {
            issues.push(ValidationIssue {
                field: "minPrice".into(),
                message: format!("minPrice ({min}) must not exceed maxPrice ({max})"),
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_kind(name: &str, kind: &ParamKind, value: &Value, issues: &mut Vec<ValidationIssue>) {
    match kind {
        ParamKind::Str { min_len, max_len } => {
            let Some(s) = value.as_str() else {
                issues.push(ValidationIssue {
                    field: name.to_string(),
                    message: "must be a string".into(),
                });
                return;
            };
            let len = s.chars().count();
            if len < *min_len {
                issues.push(ValidationIssue {
                    field: name.to_string(),
                    message: format!("must be at least {min_len} character(s)"),
                });
            }
            if len > *max_len {
                issues.push(ValidationIssue {
                    field: name.to_string(),
                    message: format!("must be at most {max_len} characters"),
                });
            }
        }
        ParamKind::Int { min, max } => {
            let Some(n) = value.as_i64() else {
                issues.push(ValidationIssue {
                    field: name.to_string(),
                    message: "must be an integer".into(),
                });
                return;
            };
            if n < *min || n > *max {
                issues.push(ValidationIssue {
                    field: name.to_string(),
                    message: format!("must be between {min} and {max}"),
                });
            }
        }
        ParamKind::Num { min, exclusive_min } => {
            let Some(n) = value.as_f64() else {
                issues.push(ValidationIssue {
                    field: name.to_string(),
                    message: "must be a number".into(),
                });
                return;
            };
            let below = if *exclusive_min { n <= *min } else { n < *min };
            if below {
                let op = if *exclusive_min { "greater than" } else { "at least" };
                issues.push(ValidationIssue {
                    field: name.to_string(),
                    message: format!("must be {op} {min}"),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ADD_TO_CART, CHECKOUT, GET_CART, SEARCH_CATALOG};
    use serde_json::json;

    fn field_errors(result: Result<(), Vec<ValidationIssue>>) -> Vec<String> {
        result
            .err()
            .unwrap_or_default()
            .into_iter()
            .map(|i| i.field)
            .collect()
    }

    #[test]
    fn valid_search_args_pass() {
        let args = json!({"query": "wireless mouse", "limit": 5, "minPrice": 5.0, "maxPrice": 50.0});
        assert!(validate_args(&SEARCH_CATALOG, &args).is_ok());
    }

    #[test]
    fn missing_required_query_fails() {
        let args = json!({"limit": 5});
        assert_eq!(field_errors(validate_args(&SEARCH_CATALOG, &args)), vec!["query"]);
    }

    #[test]
    fn price_range_must_be_non_empty() {
        let args = json!({"query": "desk", "minPrice": 100.0, "maxPrice": 50.0});
        let issues = validate_args(&SEARCH_CATALOG, &args).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("must not exceed")));
    }

    #[test]
    fn equal_min_and_max_price_is_allowed() {
        let args = json!({"query": "desk", "minPrice": 50.0, "maxPrice": 50.0});
        assert!(validate_args(&SEARCH_CATALOG, &args).is_ok());
    }

    #[test]
    fn max_price_zero_is_rejected() {
        let args = json!({"query": "desk", "maxPrice": 0.0});
        assert_eq!(field_errors(validate_args(&SEARCH_CATALOG, &args)), vec!["maxPrice"]);
    }

    #[test]
    fn min_price_zero_is_allowed() {
        let args = json!({"query": "desk", "minPrice": 0.0});
        assert!(validate_args(&SEARCH_CATALOG, &args).is_ok());
    }

    #[test]
    fn limit_out_of_bounds_fails() {
        for bad in [0, 51, -3] {
            let args = json!({"query": "desk", "limit": bad});
            assert_eq!(
                field_errors(validate_args(&SEARCH_CATALOG, &args)),
                vec!["limit"],
                "limit {bad} should fail"
            );
        }
    }

    #[test]
    fn fractional_quantity_is_not_an_integer() {
        let args = json!({"itemId": "i1", "quantity": 1.5});
        assert_eq!(field_errors(validate_args(&ADD_TO_CART, &args)), vec!["quantity"]);
    }

    #[test]
    fn quantity_bounds() {
        assert!(validate_args(&ADD_TO_CART, &json!({"itemId": "i1", "quantity": 1000})).is_ok());
        assert_eq!(
            field_errors(validate_args(&ADD_TO_CART, &json!({"itemId": "i1", "quantity": 1001}))),
            vec!["quantity"]
        );
    }

    #[test]
    fn query_length_cap() {
        let args = json!({"query": "q".repeat(501)});
        assert_eq!(field_errors(validate_args(&SEARCH_CATALOG, &args)), vec!["query"]);
    }

    #[test]
    fn notes_length_cap() {
        assert!(validate_args(&CHECKOUT, &json!({"notes": "n".repeat(2000)})).is_ok());
        assert_eq!(
            field_errors(validate_args(&CHECKOUT, &json!({"notes": "n".repeat(2001)}))),
            vec!["notes"]
        );
    }

    #[test]
    fn get_cart_accepts_empty_and_null_args() {
        assert!(validate_args(&GET_CART, &json!({})).is_ok());
        assert!(validate_args(&GET_CART, &Value::Null).is_ok());
    }

    #[test]
    fn null_args_with_required_fields_fail() {
        assert_eq!(
            field_errors(validate_args(&SEARCH_CATALOG, &Value::Null)),
            vec!["query"]
        );
    }

    #[test]
    fn non_object_args_fail() {
        assert!(validate_args(&SEARCH_CATALOG, &json!("query")).is_err());
        assert!(validate_args(&SEARCH_CATALOG, &json!([1, 2])).is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let args = json!({"query": "desk", "sortBy": "price"});
        assert!(validate_args(&SEARCH_CATALOG, &args).is_ok());
    }

    #[test]
    fn wrong_types_are_reported() {
        let args = json!({"query": 42, "limit": "five"});
        let fields = field_errors(validate_args(&SEARCH_CATALOG, &args));
        assert!(fields.contains(&"query".to_string()));
        assert!(fields.contains(&"limit".to_string()));
    }
}
