use crate::config::ApplyConfig;
use crate::rotation::Target;
use crate::wallpaper::Wallpaper;
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Puts a chosen wallpaper on screen
pub trait Applier {
    fn apply(&mut self, target: Target, wallpaper: &Wallpaper) -> Result<()>;

    /// Remove whatever is shown on `target`
    fn clear(&mut self, target: Target) -> Result<()>;
}

/// Runs the configured external command for each target (swww, hyprpaper,
/// feh, a lock screen helper, ...)
pub struct CommandApplier {
    config: ApplyConfig,
}

impl CommandApplier {
    pub fn new(config: ApplyConfig) -> Self {
        Self { config }
    }

    fn template(&self, target: Target) -> &[String] {
        match target {
            Target::Home => &self.config.home,
            Target::Lock => &self.config.lock,
        }
    }
}

/// Substitute `{path}` and `{target}` in every argument
pub fn expand_template(template: &[String], target: Target, path: Option<&Path>) -> Vec<String> {
    let path = path.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
    template
        .iter()
        .map(|arg| arg.replace("{path}", &path).replace("{target}", target.as_str()))
        .collect()
}

/// Run an argv vector, failing on a non-zero exit status
pub fn run_command(argv: &[String]) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .context("Empty command")?;

    tracing::debug!("Running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} failed: {}", program, stderr.trim());
    }

    Ok(())
}

impl Applier for CommandApplier {
    fn apply(&mut self, target: Target, wallpaper: &Wallpaper) -> Result<()> {
        let template = self.template(target);
        if template.is_empty() {
            anyhow::bail!("No apply command configured for the {} target", target);
        }

        let argv = expand_template(template, target, Some(&wallpaper.path));
        run_command(&argv)
            .with_context(|| format!("Failed to set {} wallpaper", target))?;
        tracing::info!("{}: {}", target, wallpaper.path.display());

        Ok(())
    }

    fn clear(&mut self, target: Target) -> Result<()> {
        if self.config.clear.is_empty() {
            tracing::debug!("No clear command configured, leaving {} as is", target);
            return Ok(());
        }

        let argv = expand_template(&self.config.clear, target, None);
        run_command(&argv).with_context(|| format!("Failed to clear {} wallpaper", target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallpaper::tests::sample;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand_template() {
        let argv = expand_template(
            &args(&["setter", "--{target}", "{path}"]),
            Target::Lock,
            Some(Path::new("/w/a.png")),
        );
        assert_eq!(argv, args(&["setter", "--lock", "/w/a.png"]));

        let argv = expand_template(&args(&["clear", "{path}"]), Target::Home, None);
        assert_eq!(argv, args(&["clear", ""]));
    }

    #[test]
    fn test_missing_command_is_an_error() {
        let mut applier = CommandApplier::new(ApplyConfig {
            home: Vec::new(),
            lock: Vec::new(),
            clear: Vec::new(),
        });
        assert!(applier.apply(Target::Home, &sample("a")).is_err());
        assert!(applier.clear(Target::Home).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_status() {
        assert!(run_command(&args(&["true"])).is_ok());
        assert!(run_command(&args(&["false"])).is_err());
        assert!(run_command(&[]).is_err());
    }
}
