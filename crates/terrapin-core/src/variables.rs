//! Terraform and environment variable resolution.
//!
//! Variables reach a run from several places. For Terraform variables the
//! precedence, lowest to highest, is:
//!
//! 1. `TF_VAR_<name>` entries in the process environment
//! 2. `terraform.tfvars`
//! 3. `terraform.tfvars.json`
//! 4. `*.auto.tfvars` and `*.auto.tfvars.json`, in lexical filename order
//! 5. explicit `--tf-var-file` files, in the order given
//! 6. explicit `--tf-var` flags, in the order given
//!
//! Sources 2-4 are only consulted when a configuration directory is in play
//! (not when the run uses a remote module source). Environment variables come
//! from `--env-var-file` files followed by `--env-var` flags.
//!
//! Inline flags and files are mutually exclusive per category.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use terrapin_proto::{RunVariable, VariableCategory};
use tracing::{debug, warn};

static TERRAFORM_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid terraform key regex"));

static ENVIRONMENT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid environment key regex"));

const TF_VAR_PREFIX: &str = "TF_VAR_";
const TERRAFORM_TFVARS: &str = "terraform.tfvars";
const TERRAFORM_TFVARS_JSON: &str = "terraform.tfvars.json";
const AUTO_TFVARS_SUFFIX: &str = ".auto.tfvars";
const AUTO_TFVARS_JSON_SUFFIX: &str = ".auto.tfvars.json";

/// Errors produced while resolving variables.
#[derive(Debug, thiserror::Error)]
pub enum VariableError {
    #[error("must not combine {} and {}", inline_flag(.category), file_flag(.category))]
    Conflict { category: VariableCategory },

    #[error("invalid variable '{0}': expected key=value")]
    InvalidAssignment(String),

    #[error("invalid {category} variable name '{key}'")]
    InvalidKey {
        key: String,
        category: VariableCategory,
    },

    #[error("failed to read variable file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse variable file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

fn inline_flag(category: &VariableCategory) -> &'static str {
    match category {
        VariableCategory::Terraform => "--tf-var",
        VariableCategory::Environment => "--env-var",
    }
}

fn file_flag(category: &VariableCategory) -> &'static str {
    match category {
        VariableCategory::Terraform => "--tf-var-file",
        VariableCategory::Environment => "--env-var-file",
    }
}

/// Raw variable inputs as collected from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSources {
    /// Inline `key=value` Terraform variables, sent as plain strings.
    pub tf_vars: Vec<String>,
    /// Inline `key=value` Terraform variables whose value is an HCL expression.
    pub tf_hcl_vars: Vec<String>,
    pub tf_var_files: Vec<PathBuf>,
    /// Inline `KEY=VALUE` environment variables.
    pub env_vars: Vec<String>,
    pub env_var_files: Vec<PathBuf>,
}

impl VariableSources {
    /// Rejects inline flags combined with files for the same category.
    pub fn validate(&self) -> Result<(), VariableError> {
        let has_inline_tf = !self.tf_vars.is_empty() || !self.tf_hcl_vars.is_empty();
        if has_inline_tf && !self.tf_var_files.is_empty() {
            return Err(VariableError::Conflict {
                category: VariableCategory::Terraform,
            });
        }
        if !self.env_vars.is_empty() && !self.env_var_files.is_empty() {
            return Err(VariableError::Conflict {
                category: VariableCategory::Environment,
            });
        }
        Ok(())
    }
}

/// The merged variable set for a run, one ordered list per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedVariables {
    pub terraform: Vec<RunVariable>,
    pub environment: Vec<RunVariable>,
}

impl ResolvedVariables {
    pub fn get(&self, category: VariableCategory, key: &str) -> Option<&RunVariable> {
        let vars = match category {
            VariableCategory::Terraform => &self.terraform,
            VariableCategory::Environment => &self.environment,
        };
        vars.iter().find(|v| v.key == key)
    }

    pub fn len(&self) -> usize {
        self.terraform.len() + self.environment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens both categories, Terraform variables first.
    pub fn into_run_variables(self) -> Vec<RunVariable> {
        let mut all = self.terraform;
        all.extend(self.environment);
        all
    }
}

/// Ordered set where a later insert of an existing key replaces its value in place.
struct VariableSet {
    category: VariableCategory,
    vars: Vec<RunVariable>,
}

impl VariableSet {
    fn new(category: VariableCategory) -> Self {
        Self {
            category,
            vars: Vec::new(),
        }
    }

    fn set(&mut self, key: String, value: String, hcl: bool) -> Result<(), VariableError> {
        let pattern = match self.category {
            VariableCategory::Terraform => &*TERRAFORM_KEY,
            VariableCategory::Environment => &*ENVIRONMENT_KEY,
        };
        if !pattern.is_match(&key) {
            return Err(VariableError::InvalidKey {
                key,
                category: self.category,
            });
        }

        if let Some(existing) = self.vars.iter_mut().find(|v| v.key == key) {
            debug!(
                key = %key,
                category = %self.category,
                "Overriding variable from a higher-precedence source"
            );
            existing.value = value;
            existing.hcl = hcl;
        } else {
            self.vars.push(RunVariable::new(key, value, hcl, self.category));
        }
        Ok(())
    }

    fn extend(&mut self, entries: Vec<(String, String, bool)>) -> Result<(), VariableError> {
        for (key, value, hcl) in entries {
            self.set(key, value, hcl)?;
        }
        Ok(())
    }
}

/// Merges variables from flags, files, and convention-based discovery.
#[derive(Debug, Clone)]
pub struct VariableResolver {
    directory: Option<PathBuf>,
    process_env: Vec<(String, String)>,
}

impl VariableResolver {
    /// Creates a resolver that reads `TF_VAR_` entries from the process environment.
    ///
    /// `directory` is the configuration directory; pass `None` for module-source
    /// runs so no `.tfvars` files are discovered.
    pub fn new(directory: Option<PathBuf>) -> Self {
        let process_env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self {
            directory,
            process_env,
        }
    }

    /// Replaces the environment snapshot used for `TF_VAR_` lookups.
    pub fn with_process_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.process_env = env.into_iter().collect();
        self
    }

    /// Resolves both categories. Nothing is returned unless every source loads cleanly.
    pub fn resolve(&self, sources: &VariableSources) -> Result<ResolvedVariables, VariableError> {
        sources.validate()?;

        let terraform = self.resolve_terraform(sources)?;
        let environment = Self::resolve_environment(sources)?;

        debug!(
            terraform = terraform.len(),
            environment = environment.len(),
            "Resolved run variables"
        );

        Ok(ResolvedVariables {
            terraform,
            environment,
        })
    }

    fn resolve_terraform(
        &self,
        sources: &VariableSources,
    ) -> Result<Vec<RunVariable>, VariableError> {
        let mut set = VariableSet::new(VariableCategory::Terraform);

        for (name, value) in &self.process_env {
            if let Some(key) = name.strip_prefix(TF_VAR_PREFIX) {
                if TERRAFORM_KEY.is_match(key) {
                    set.set(key.to_string(), value.clone(), false)?;
                } else {
                    warn!("Ignoring environment variable {} with an invalid variable name", name);
                }
            }
        }

        if let Some(directory) = &self.directory {
            for path in discover_tfvars_files(directory)? {
                debug!(file = %path.display(), "Loading auto-discovered variables file");
                set.extend(load_tfvars_file(&path)?)?;
            }
        }

        for path in &sources.tf_var_files {
            set.extend(load_tfvars_file(path)?)?;
        }

        for raw in &sources.tf_vars {
            let (key, value) = parse_assignment(raw)?;
            set.set(key, value, false)?;
        }
        for raw in &sources.tf_hcl_vars {
            let (key, value) = parse_assignment(raw)?;
            set.set(key, value, true)?;
        }

        Ok(set.vars)
    }

    fn resolve_environment(sources: &VariableSources) -> Result<Vec<RunVariable>, VariableError> {
        let mut set = VariableSet::new(VariableCategory::Environment);

        for path in &sources.env_var_files {
            let content = read_file(path)?;
            set.extend(parse_env_file(path, &content)?)?;
        }

        for raw in &sources.env_vars {
            let (key, value) = parse_assignment(raw)?;
            set.set(key, value, false)?;
        }

        Ok(set.vars)
    }
}

/// Lists the convention-based variable files in `directory`, lowest precedence first.
fn discover_tfvars_files(directory: &Path) -> Result<Vec<PathBuf>, VariableError> {
    let mut files = Vec::new();

    for name in [TERRAFORM_TFVARS, TERRAFORM_TFVARS_JSON] {
        let path = directory.join(name);
        if path.is_file() {
            files.push(path);
        }
    }

    let entries = fs::read_dir(directory).map_err(|source| VariableError::Read {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut auto_files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| VariableError::Read {
            path: directory.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if (name.ends_with(AUTO_TFVARS_SUFFIX) || name.ends_with(AUTO_TFVARS_JSON_SUFFIX))
            && path.is_file()
        {
            auto_files.push(path);
        }
    }
    auto_files.sort();
    files.extend(auto_files);

    Ok(files)
}

fn read_file(path: &Path) -> Result<String, VariableError> {
    fs::read_to_string(path).map_err(|source| VariableError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a `.tfvars` (HCL) or `.tfvars.json` file into `(key, value, hcl)` entries.
fn load_tfvars_file(path: &Path) -> Result<Vec<(String, String, bool)>, VariableError> {
    let content = read_file(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        parse_json_tfvars(&content)
    } else {
        parse_hcl_tfvars(&content)
    };

    parsed.map_err(|message| VariableError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_hcl_tfvars(content: &str) -> Result<Vec<(String, String, bool)>, String> {
    let body: hcl::Value = hcl::from_str(content).map_err(|e| e.to_string())?;
    let hcl::Value::Object(attributes) = body else {
        return Err("expected variable assignments".to_string());
    };

    attributes
        .into_iter()
        .map(|(key, value)| match value {
            hcl::Value::String(s) => Ok((key, s, false)),
            other => serde_json::to_string(&other)
                .map(|encoded| (key, encoded, true))
                .map_err(|e| e.to_string()),
        })
        .collect()
}

fn parse_json_tfvars(content: &str) -> Result<Vec<(String, String, bool)>, String> {
    let document: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let serde_json::Value::Object(attributes) = document else {
        return Err("expected a JSON object of variable assignments".to_string());
    };

    Ok(attributes
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s, false),
            other => (key, other.to_string(), true),
        })
        .collect())
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped and a
/// value wrapped in double quotes is unquoted.
fn parse_env_file(
    path: &Path,
    content: &str,
) -> Result<Vec<(String, String, bool)>, VariableError> {
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(VariableError::Parse {
                path: path.to_path_buf(),
                message: format!("line {}: expected KEY=VALUE", index + 1),
            });
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        entries.push((key.trim().to_string(), value.to_string(), false));
    }
    Ok(entries)
}

/// Splits an inline `key=value` flag on the first `=`.
fn parse_assignment(raw: &str) -> Result<(String, String), VariableError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(VariableError::InvalidAssignment(raw.to_string())),
    }
}
