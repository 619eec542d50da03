//! Parameter validation at the compiler boundary.
//!
//! Raw `name -> ParamValue` maps are checked against the fixture's schema for
//! the action: unknown keys and missing required keys are rejected, values are
//! type-checked per `ParamKind`, numeric ranges are enforced and defaults are
//! filled in. Effect generators only ever see a `ResolvedParams`.

use std::collections::BTreeMap;

use crate::error::{ShowError, ShowResult};
use crate::fixtures::models::{ActionSchema, ParamKind, ParamSpec};
use crate::models::actions::{ActionModel, ParamValue};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    values: BTreeMap<String, ParamValue>,
}

impl ResolvedParams {
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(ParamValue::as_f64)
    }

    /// Integer parameter as a DMX level; schema ranges keep it inside 0-255.
    pub fn level(&self, name: &str) -> Option<u8> {
        self.number(name).map(|v| v.round().clamp(0.0, 255.0) as u8)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(ParamValue::as_str)
    }
}

pub fn resolve(action: &ActionModel, schema: &ActionSchema) -> ShowResult<ResolvedParams> {
    let invalid = |reason: String| {
        ShowError::invalid_action(&action.fixture_id, &action.action_type, reason)
    };

    if let Some(unknown) = action
        .parameters
        .keys()
        .find(|name| schema.param(name).is_none())
    {
        return Err(invalid(format!("unknown parameter '{}'", unknown)));
    }

    let mut values = BTreeMap::new();
    for spec in &schema.params {
        let value = match action.parameters.get(&spec.name) {
            Some(value) => {
                check_value(spec, value).map_err(|e| match e {
                    ValueError::Type(reason) => invalid(reason),
                    ValueError::Range(err) => err,
                })?;
                value.clone()
            }
            None => match &spec.default {
                Some(default) => default.clone(),
                None => {
                    return Err(invalid(format!(
                        "missing required parameter '{}'",
                        spec.name
                    )))
                }
            },
        };
        values.insert(spec.name.clone(), value);
    }

    Ok(ResolvedParams { values })
}

enum ValueError {
    Type(String),
    Range(ShowError),
}

fn check_value(spec: &ParamSpec, value: &ParamValue) -> Result<(), ValueError> {
    let wrong_type = |expected: &str| {
        ValueError::Type(format!(
            "parameter '{}' must be {}, got {:?}",
            spec.name, expected, value
        ))
    };

    match &spec.kind {
        ParamKind::Number { min, max } => {
            let v = value.as_f64().ok_or_else(|| wrong_type("a number"))?;
            check_range(spec, v, *min, *max)
        }
        ParamKind::Integer { min, max } => {
            let v = value.as_f64().ok_or_else(|| wrong_type("an integer"))?;
            if v.fract() != 0.0 {
                return Err(wrong_type("an integer"));
            }
            check_range(spec, v, *min, *max)
        }
        ParamKind::Boolean => value.as_bool().map(|_| ()).ok_or_else(|| wrong_type("a boolean")),
        ParamKind::Text => value.as_str().map(|_| ()).ok_or_else(|| wrong_type("text")),
        ParamKind::Choice { options } => {
            let v = value.as_str().ok_or_else(|| wrong_type("text"))?;
            if options.iter().any(|o| o == v) {
                Ok(())
            } else {
                Err(ValueError::Type(format!(
                    "parameter '{}' must be one of {:?}, got '{}'",
                    spec.name, options, v
                )))
            }
        }
    }
}

fn check_range(spec: &ParamSpec, v: f64, min: Option<f64>, max: Option<f64>) -> Result<(), ValueError> {
    if !v.is_finite() {
        return Err(ValueError::Type(format!(
            "parameter '{}' must be finite",
            spec.name
        )));
    }
    let lo = min.unwrap_or(f64::NEG_INFINITY);
    let hi = max.unwrap_or(f64::INFINITY);
    if v < lo || v > hi {
        return Err(ValueError::Range(ShowError::ParameterOutOfRange {
            name: spec.name.clone(),
            value: v,
            min: lo,
            max: hi,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::templates::ActionTemplate;

    fn strobe(params: &[(&str, ParamValue)]) -> ActionModel {
        let mut action = ActionModel::new("par1", "strobe", 0.0, 1.0);
        for (k, v) in params {
            action.parameters.insert(k.to_string(), v.clone());
        }
        action
    }

    #[test]
    fn defaults_fill_missing_optional_params() {
        let schema = ActionTemplate::Strobe.standard_schema();
        let resolved = resolve(&strobe(&[("rate", 10.0.into())]), &schema).unwrap();
        assert_eq!(resolved.number("rate"), Some(10.0));
        assert_eq!(resolved.number("duty"), Some(0.5));
        assert_eq!(resolved.level("level"), Some(255));
        assert_eq!(resolved.text("target"), Some(""));
    }

    #[test]
    fn missing_required_param_is_invalid_action() {
        let schema = ActionTemplate::Strobe.standard_schema();
        let err = resolve(&strobe(&[]), &schema).unwrap_err();
        assert_eq!(err.kind(), "InvalidAction");
        assert!(err.to_string().contains("rate"));
    }

    #[test]
    fn unknown_param_is_invalid_action() {
        let schema = ActionTemplate::Strobe.standard_schema();
        let err = resolve(
            &strobe(&[("rate", 10.0.into()), ("sparkle", true.into())]),
            &schema,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidAction");
        assert!(err.to_string().contains("sparkle"));
    }

    #[test]
    fn out_of_range_number_is_reported_with_bounds() {
        let schema = ActionTemplate::Strobe.standard_schema();
        let err = resolve(&strobe(&[("rate", 500.0.into())]), &schema).unwrap_err();
        match err {
            ShowError::ParameterOutOfRange { name, min, max, .. } => {
                assert_eq!(name, "rate");
                assert_eq!((min, max), (0.1, 50.0));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let schema = ActionTemplate::Strobe.standard_schema();
        let err = resolve(&strobe(&[("rate", "fast".into())]), &schema).unwrap_err();
        assert_eq!(err.kind(), "InvalidAction");

        let err = resolve(
            &strobe(&[("rate", 10.0.into()), ("level", 12.5.into())]),
            &schema,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidAction");

        let fade = ActionTemplate::FadeIn.standard_schema();
        let mut action = ActionModel::new("par1", "fade_in", 0.0, 1.0);
        action.parameters.insert("curve".into(), "wobble".into());
        assert_eq!(resolve(&action, &fade).unwrap_err().kind(), "InvalidAction");
    }
}
