use crate::config::NotificationConfig;
use crate::rotation::Target;
use crate::wallpaper::Wallpaper;

/// Reports rotation results to the user
pub trait Notifier {
    fn wallpaper_changed(&mut self, target: Target, wallpaper: &Wallpaper);

    fn error(&mut self, message: &str);
}

/// Prints to the terminal and optionally forwards to a desktop notification
/// command such as `notify-send`
pub struct ConsoleNotifier {
    config: NotificationConfig,
}

impl ConsoleNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    fn forward(&self, title: &str, body: &str) {
        if self.config.command.is_empty() {
            return;
        }
        let argv: Vec<String> = self
            .config
            .command
            .iter()
            .map(|arg| arg.replace("{title}", title).replace("{body}", body))
            .collect();
        // Logged only; notifications never fail a rotation
        if let Err(e) = crate::apply::run_command(&argv) {
            tracing::warn!("Notification command failed: {:#}", e);
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn wallpaper_changed(&mut self, target: Target, wallpaper: &Wallpaper) {
        if !self.config.enabled {
            return;
        }
        println!("{}: {}", target, wallpaper.path.display());
        self.forward(
            &format!("Wallpaper changed ({})", target),
            &wallpaper.name,
        );
    }

    fn error(&mut self, message: &str) {
        // Errors are shown even when change notifications are off
        eprintln!("Error: {}", message);
        self.forward("periwall: rotation failed", message);
    }
}
