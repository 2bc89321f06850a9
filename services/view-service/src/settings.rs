use serde::Serialize;
use std::{collections::BTreeMap, collections::HashMap, env, fmt, num::IntErrorKind};

pub const FIELD_ACTION: &str = "action";
pub const ACTION_DEFAULT_SETUP: &str = "default_setup";
pub const FIELD_TIMEOUT: &str = "ckanext.jupyternotebook.timeout";
pub const FIELD_MAX_USER: &str = "ckanext.jupyternotebook.max_user";
pub const FIELD_CPU: &str = "ckanext.jupyternotebook.cpu";
pub const FIELD_MEMORY: &str = "ckanext.jupyternotebook.memory";

pub const ENV_TIMEOUT: &str = "CKAN_JUPYTERHUB_TIMEOUT";
pub const ENV_MAX_USER: &str = "CKAN_JUPYTERHUB_USER";
pub const ENV_CPU: &str = "CKAN_JUPYTERHUB_PERCENTAGE_CPU";
pub const ENV_MEMORY: &str = "CKAN_JUPYTERHUB_MEMORY_LIMIT";

/// Raw admin form input, untouched apart from trimming the memory field.
#[derive(Debug, Default)]
pub struct SettingsForm {
    pub timeout: String,
    pub max_user: String,
    pub cpu: String,
    pub memory: String,
}

impl SettingsForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Self {
            timeout: field(FIELD_TIMEOUT),
            max_user: field(FIELD_MAX_USER),
            cpu: field(FIELD_CPU),
            memory: field(FIELD_MEMORY).trim().to_string(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimitSettings {
    pub timeout_secs: u64,
    pub max_users: u32,
    pub cpu_percent: u8,
    pub memory_limit: String,
}

const TIMEOUT_TOO_SHORT: &str = "Timeout must be at least 5 seconds";
const MAX_USER_TOO_SMALL: &str = "Maximum users must be greater than 0";
const CPU_OUT_OF_RANGE: &str = "CPU percentage must be between 1 and 100";
const MEMORY_TOO_SMALL: &str = "Memory value must be greater than 0";

fn at_most(what: &str, bound: impl fmt::Display) -> ValidationError {
    ValidationError(format!("{what} must be at most {bound}"))
}

/// Integers past the `i64` range report the range message for their side
/// instead of a parse failure.
fn parse_int(
    name: &str,
    raw: &str,
    too_small: impl FnOnce() -> ValidationError,
    too_large: impl FnOnce() -> ValidationError,
) -> Result<i64, ValidationError> {
    raw.trim().parse::<i64>().map_err(|err| match err.kind() {
        IntErrorKind::PosOverflow => too_large(),
        IntErrorKind::NegOverflow => too_small(),
        _ => ValidationError(format!("invalid {name} value: {raw}")),
    })
}

fn rule(message: &str) -> impl FnOnce() -> ValidationError + '_ {
    move || ValidationError(message.to_string())
}

/// Checks the form in field order and stops at the first violation.
pub fn validate(form: &SettingsForm) -> Result<ResourceLimitSettings, ValidationError> {
    let timeout = parse_int("timeout", &form.timeout, rule(TIMEOUT_TOO_SHORT), || {
        at_most("Timeout", format!("{} seconds", i64::MAX))
    })?;
    if timeout < 5 {
        return Err(rule(TIMEOUT_TOO_SHORT)());
    }

    let max_user = parse_int("max_user", &form.max_user, rule(MAX_USER_TOO_SMALL), || {
        at_most("Maximum users", u32::MAX)
    })?;
    if max_user <= 0 {
        return Err(rule(MAX_USER_TOO_SMALL)());
    }
    let max_users = u32::try_from(max_user).map_err(|_| at_most("Maximum users", u32::MAX))?;

    let cpu = parse_int("cpu", &form.cpu, rule(CPU_OUT_OF_RANGE), rule(CPU_OUT_OF_RANGE))?;
    if !(1..=100).contains(&cpu) {
        return Err(rule(CPU_OUT_OF_RANGE)());
    }

    let memory = form.memory.as_str();
    if !memory.ends_with(['M', 'G']) {
        return Err(ValidationError("Memory must end with M or G".to_string()));
    }
    let memory_value = parse_int(
        "memory",
        &memory[..memory.len() - 1],
        rule(MEMORY_TOO_SMALL),
        || at_most("Memory value", i64::MAX),
    )?;
    if memory_value <= 0 {
        return Err(rule(MEMORY_TOO_SMALL)());
    }

    Ok(ResourceLimitSettings {
        timeout_secs: timeout as u64,
        max_users,
        cpu_percent: cpu as u8,
        memory_limit: memory.to_string(),
    })
}

impl ResourceLimitSettings {
    /// Variable updates in the order they are applied locally.
    pub fn env_updates(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_TIMEOUT, self.timeout_secs.to_string()),
            (ENV_MAX_USER, self.max_users.to_string()),
            (ENV_CPU, self.cpu_percent.to_string()),
            (ENV_MEMORY, self.memory_limit.clone()),
        ]
    }

    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.env_updates()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

/// Values shown on the admin page, straight from the process environment.
#[derive(Serialize, Debug, PartialEq)]
pub struct CurrentSettings {
    pub timeout: String,
    pub max_user: String,
    pub cpu: String,
    pub memory: String,
}

impl CurrentSettings {
    pub fn from_env() -> Self {
        let read = |key: &str| env::var(key).unwrap_or_default();
        Self {
            timeout: read(ENV_TIMEOUT),
            max_user: read(ENV_MAX_USER),
            cpu: read(ENV_CPU),
            memory: read(ENV_MEMORY),
        }
    }
}

fn set_env(key: &str, value: &str) -> Result<(), String> {
    // set_var panics on these instead of failing.
    if key.is_empty() || key.contains(['=', '\0']) {
        return Err(format!("invalid variable name {key:?}"));
    }
    if value.contains('\0') {
        return Err(format!("invalid value for {key}"));
    }
    env::set_var(key, value);
    Ok(())
}

/// Applies updates in order and stops at the first one that fails.
pub fn apply_local(updates: &[(&'static str, String)]) -> Result<(), String> {
    for (key, value) in updates {
        if let Err(err) = set_env(key, value) {
            tracing::error!(key = *key, error = %err, "local settings update failed");
            return Err(err);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsOutcome {
    Updated,
    RemoteFailed,
    Failed,
}

impl SettingsOutcome {
    pub fn from_results(local_ok: bool, remote_ok: bool) -> Self {
        match (local_ok, remote_ok) {
            (true, true) => SettingsOutcome::Updated,
            (true, false) => SettingsOutcome::RemoteFailed,
            _ => SettingsOutcome::Failed,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SettingsOutcome::Updated => "JupyterHub settings have been updated.",
            SettingsOutcome::RemoteFailed => {
                "Local settings updated but failed to update JupyterHub container."
            }
            SettingsOutcome::Failed => "Error updating JupyterHub settings.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsOutcome::Updated => "updated",
            SettingsOutcome::RemoteFailed => "remote_failed",
            SettingsOutcome::Failed => "failed",
        }
    }
}
