use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "ums.toml";

/// Per-workspace settings read from `ums.toml`. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub institution_name: String,
    pub country_line: String,
    pub currency: String,
    pub default_student_password: String,
    pub academic_year_start_month: u32,
    pub media_dir: String,
    pub exports_dir: String,
    pub password_iterations: u32,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            institution_name: "Université".to_string(),
            country_line: "République Démocratique du Congo".to_string(),
            currency: "USD".to_string(),
            default_student_password: "changeme_initial_password".to_string(),
            academic_year_start_month: 8,
            media_dir: "media".to_string(),
            exports_dir: "exports".to_string(),
            password_iterations: 100_000,
        }
    }
}

impl WorkspaceConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let cfg: WorkspaceConfig = toml::from_str(text).context("failed to parse ums.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(1..=12).contains(&self.academic_year_start_month) {
            return Err(anyhow!(
                "academic_year_start_month must be in 1..=12 (got {})",
                self.academic_year_start_month
            ));
        }
        if self.password_iterations == 0 {
            return Err(anyhow!("password_iterations must be >= 1"));
        }
        if self.currency.trim().is_empty() {
            return Err(anyhow!("currency must not be empty"));
        }
        Ok(())
    }

    pub fn media_root(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.media_dir)
    }

    pub fn exports_root(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.exports_dir)
    }
}

/// Missing file means defaults; a present but malformed file is an error.
pub fn load_workspace_config(workspace: &Path) -> anyhow::Result<WorkspaceConfig> {
    let path = workspace.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(WorkspaceConfig::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    WorkspaceConfig::parse(&text)
}
