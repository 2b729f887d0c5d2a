use crate::engine::thresholds::{ThresholdRule, compile};
use crate::error::Error;
use crate::http::HttpSettings;
use crate::module::{RequestPlan, RequestSpec};
use crate::types::{Options, ScenarioOptions};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// On-disk shape of a test script.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    pub scenarios: BTreeMap<String, ScenarioOptions>,
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdRule>,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    pub name: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Load a test script: read, interpolate `${VAR}` references, parse, and
/// validate. Produces the engine inputs: options (with any thresholds
/// compiled in), the request-plan module, and the VU client settings.
pub fn load_script(path: &Path) -> Result<(Options, Arc<RequestPlan>, HttpSettings), Error> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::ModuleLoad(format!("failed to read {}: {e}", path.display())))?;
    let raw = interpolate_env_vars(&raw)?;
    let script: ScriptConfig = toml::from_str(&raw)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
    script_into_parts(script)
}

pub fn script_into_parts(
    script: ScriptConfig,
) -> Result<(Options, Arc<RequestPlan>, HttpSettings), Error> {
    if script.requests.is_empty() {
        return Err(Error::Config(
            "script defines no requests; add at least one [[requests]] entry".to_string(),
        ));
    }
    let requests = script
        .requests
        .into_iter()
        .map(request_spec)
        .collect::<Result<Vec<_>, Error>>()?;
    let threshold = (!script.thresholds.is_empty()).then(|| compile(script.thresholds));
    let options = Options {
        scenarios: script.scenarios.into_iter().collect(),
        threshold,
    };
    options.validate()?;
    Ok((options, Arc::new(RequestPlan::new(requests)), script.http))
}

fn request_spec(config: RequestConfig) -> Result<RequestSpec, Error> {
    let method: reqwest::Method = config
        .method
        .to_uppercase()
        .parse()
        .map_err(|_| Error::Config(format!("invalid HTTP method: {}", config.method)))?;
    Ok(RequestSpec {
        name: config.name,
        method,
        url: config.url,
        headers: config.headers.into_iter().collect(),
        body: config.body,
    })
}

/// `${NAME}` / `${NAME:-default}` interpolation over the raw script text.
fn interpolate_env_vars(content: &str) -> Result<String, Error> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();

    for capture in re.captures_iter(content) {
        let full_match = capture.get(0).unwrap().as_str();
        let var_expr = capture.get(1).unwrap().as_str();

        let (var_name, default) = match var_expr.find(":-") {
            Some(pos) => (&var_expr[..pos], Some(&var_expr[pos + 2..])),
            None => (var_expr, None),
        };

        // Request-template variables are resolved per iteration, not here.
        if var_name == "VU_ID" || var_name == "ITERATION" {
            continue;
        }

        let value = match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => match default {
                Some(default) => default.to_string(),
                None => {
                    return Err(Error::Config(format!(
                        "environment variable '{var_name}' not set"
                    )));
                }
            },
        };

        result = result.replace(full_match, &value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_default_applies_when_unset() {
        let out = interpolate_env_vars("url = \"${STAMPEDE_TEST_UNSET_VAR:-http://localhost}\"")
            .unwrap();
        assert_eq!(out, "url = \"http://localhost\"");
    }

    #[test]
    fn missing_env_without_default_errors() {
        let err = interpolate_env_vars("url = \"${STAMPEDE_TEST_UNSET_VAR}\"").unwrap_err();
        assert!(err.to_string().contains("STAMPEDE_TEST_UNSET_VAR"));
    }

    #[test]
    fn request_template_vars_survive() {
        let out = interpolate_env_vars("url = \"/users/${VU_ID}/${ITERATION}\"").unwrap();
        assert_eq!(out, "url = \"/users/${VU_ID}/${ITERATION}\"");
    }
}
