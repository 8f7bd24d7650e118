//! On-disk stack format (TOML) and its conversion into [`ServiceSpec`]s.
//!
//! The file carries shared values (network name, credentials) in a `[vars]`
//! table. They are substituted into service definitions here, once, so the
//! orchestration code only ever sees explicit values.

use super::error::RegistryError;
use crate::model::{
    Dependency, HealthCheck, Protocol, ProvisioningAction, Requirement, ResourceKind,
    RestartPolicy, ServiceSpec, DEFAULT_ACTION_TIMEOUT,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_STACK_NAME: &str = "stack";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StackFile {
    #[serde(default)]
    pub stack: StackSection,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StackSection {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DefaultsSection {
    #[serde(default)]
    pub health: HealthDefaults,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HealthDefaults {
    #[serde(default, deserialize_with = "duration::optional")]
    pub interval: Option<Duration>,
    #[serde(default, deserialize_with = "duration::optional")]
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
    #[serde(default, deserialize_with = "duration::optional")]
    pub budget: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServiceEntry {
    pub name: String,
    pub start: String,
    #[serde(default)]
    pub depends_on: Vec<DependencyEntry>,
    pub health: HealthEntry,
    #[serde(default)]
    pub provision: Vec<ActionEntry>,
    #[serde(default)]
    pub restart: RestartEntry,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DependencyEntry {
    Name(String),
    Detailed(DetailedDependency),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DetailedDependency {
    pub service: String,
    #[serde(default)]
    pub requires: Requirement,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ProbeKind {
    Tcp,
    Http,
    Command,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HealthEntry {
    pub kind: ProbeKind,
    pub address: Option<String>,
    pub url: Option<String>,
    pub command: Option<String>,
    pub expect_status: Option<u16>,
    #[serde(default, deserialize_with = "duration::optional")]
    pub interval: Option<Duration>,
    #[serde(default, deserialize_with = "duration::optional")]
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
    #[serde(default, deserialize_with = "duration::optional")]
    pub budget: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ActionEntry {
    pub name: String,
    #[serde(default)]
    pub kind: ResourceKind,
    pub resource: Option<String>,
    pub check: String,
    pub apply: String,
    #[serde(default, deserialize_with = "duration::optional")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub(crate) enum RestartEntry {
    #[default]
    Never,
    OnFailure(OnFailureEntry),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OnFailureEntry {
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_max_restarts() -> u32 {
    1
}

impl StackFile {
    pub fn stack_name(&self) -> String {
        self.stack
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_STACK_NAME.to_string())
    }

    /// Converts every entry into a [`ServiceSpec`], substituting `{{placeholders}}`.
    pub fn into_specs(self) -> Result<Vec<ServiceSpec>, RegistryError> {
        let stack_name = self.stack_name();
        let defaults = self.defaults.health;
        self.services
            .into_iter()
            .map(|entry| {
                let service = entry.name.clone();
                let vars = Vars {
                    stack: &stack_name,
                    service: &service,
                    values: &self.vars,
                };
                entry.into_spec(&vars, &defaults)
            })
            .collect()
    }
}

impl ServiceEntry {
    fn into_spec(self, vars: &Vars<'_>, defaults: &HealthDefaults) -> Result<ServiceSpec, RegistryError> {
        let health = self.health.into_check(vars, defaults)?;
        let provision = self
            .provision
            .into_iter()
            .map(|action| action.into_action(vars))
            .collect::<Result<Vec<_>, _>>()?;
        let depends_on = self
            .depends_on
            .into_iter()
            .map(|dep| match dep {
                DependencyEntry::Name(service) => Dependency::provisioned(service),
                DependencyEntry::Detailed(DetailedDependency { service, requires }) => {
                    Dependency { service, requires }
                }
            })
            .collect();
        let restart = match self.restart {
            RestartEntry::Never => RestartPolicy::Never,
            RestartEntry::OnFailure(OnFailureEntry { max_restarts }) => {
                RestartPolicy::OnFailure { max_restarts }
            }
        };

        Ok(ServiceSpec {
            start: vars.render(&self.start)?,
            name: self.name,
            depends_on,
            health,
            provision,
            restart,
        })
    }
}

impl HealthEntry {
    fn into_check(self, vars: &Vars<'_>, defaults: &HealthDefaults) -> Result<HealthCheck, RegistryError> {
        let missing = |field: &str| RegistryError::InvalidHealthCheck {
            service: vars.service.to_string(),
            reason: format!("{:?} check requires `{field}`", self.kind).to_lowercase(),
        };
        let protocol = match self.kind {
            ProbeKind::Tcp => Protocol::Tcp {
                address: vars.render(self.address.as_deref().ok_or_else(|| missing("address"))?)?,
            },
            ProbeKind::Http => Protocol::Http {
                url: vars.render(self.url.as_deref().ok_or_else(|| missing("url"))?)?,
                expect_status: self.expect_status,
            },
            ProbeKind::Command => Protocol::Command {
                command: vars.render(self.command.as_deref().ok_or_else(|| missing("command"))?)?,
            },
        };

        let max_attempts = self.max_attempts.or(defaults.max_attempts);
        if max_attempts == Some(0) {
            return Err(RegistryError::InvalidHealthCheck {
                service: vars.service.to_string(),
                reason: "max_attempts must be at least 1".to_string(),
            });
        }

        let mut check = HealthCheck::new(protocol);
        if let Some(interval) = self.interval.or(defaults.interval) {
            check.interval = interval;
        }
        if let Some(timeout) = self.timeout.or(defaults.timeout) {
            check.timeout = timeout;
        }
        if let Some(max_attempts) = max_attempts {
            check.max_attempts = max_attempts;
        }
        check.budget = self.budget.or(defaults.budget);
        Ok(check)
    }
}

impl ActionEntry {
    fn into_action(self, vars: &Vars<'_>) -> Result<ProvisioningAction, RegistryError> {
        let resource = match &self.resource {
            Some(resource) => vars.render(resource)?,
            None => self.name.clone(),
        };
        Ok(ProvisioningAction {
            check: vars.render(&self.check)?,
            apply: vars.render(&self.apply)?,
            timeout: self.timeout.unwrap_or(DEFAULT_ACTION_TIMEOUT),
            name: self.name,
            kind: self.kind,
            resource,
        })
    }
}

// =============================================================================
// TEMPLATING
// =============================================================================

/// Values visible to `{{placeholders}}` while one service is converted.
struct Vars<'a> {
    stack: &'a str,
    service: &'a str,
    values: &'a BTreeMap<String, String>,
}

impl Vars<'_> {
    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "stack.name" => Some(self.stack),
            "service.name" => Some(self.service),
            other => self.values.get(other).map(String::as_str),
        }
    }

    /// Replaces every `{{ key }}` in `template`.
    ///
    /// Only name-shaped keys (`pg_user`, `stack.name`) are placeholders;
    /// anything else, such as a Go template `{{.State.Health.Status}}`, and
    /// text without a closing `}}` are kept as is.
    fn render(&self, template: &str) -> Result<String, RegistryError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            let end = open + 2 + close + 2;
            let key = rest[open + 2..open + 2 + close].trim();
            if !is_variable_name(key) {
                out.push_str(&rest[..end]);
                rest = &rest[end..];
                continue;
            }
            let value = self.lookup(key).ok_or_else(|| RegistryError::UnknownVariable {
                service: self.service.to_string(),
                variable: key.to_string(),
            })?;
            out.push_str(&rest[..open]);
            out.push_str(value);
            rest = &rest[end..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn is_variable_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

mod duration {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    /// Accepts humantime strings (`"500ms"`, `"2m"`) or integer seconds.
    pub fn optional<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
            Some(Raw::Text(text)) => humantime::parse_duration(&text)
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid duration `{text}`: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars<'a>(values: &'a BTreeMap<String, String>) -> Vars<'a> {
        Vars {
            stack: "lakehouse",
            service: "minio",
            values,
        }
    }

    #[test]
    fn render_substitutes_builtins_and_vars() {
        let values = BTreeMap::from([("network".to_string(), "data-net".to_string())]);
        let rendered = vars(&values)
            .render("docker network inspect {{ network }} # {{stack.name}}/{{service.name}}")
            .unwrap();
        assert_eq!(rendered, "docker network inspect data-net # lakehouse/minio");
    }

    #[test]
    fn render_rejects_unknown_variable() {
        let values = BTreeMap::new();
        let err = vars(&values).render("mc mb local/{{bucket}}").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnknownVariable { ref variable, .. } if variable == "bucket"
        ));
    }

    #[test]
    fn render_leaves_go_templates_alone() {
        let values = BTreeMap::new();
        let command = "test \"$(docker inspect -f '{{.State.Health.Status}}' {{ service.name }})\" = healthy";
        assert_eq!(
            vars(&values).render(command).unwrap(),
            "test \"$(docker inspect -f '{{.State.Health.Status}}' minio)\" = healthy"
        );
        assert_eq!(
            vars(&values).render("docker ps --format '{{json .Names}}'").unwrap(),
            "docker ps --format '{{json .Names}}'"
        );
    }

    #[test]
    fn render_keeps_unterminated_braces() {
        let values = BTreeMap::new();
        assert_eq!(vars(&values).render("echo {{oops").unwrap(), "echo {{oops");
    }
}
