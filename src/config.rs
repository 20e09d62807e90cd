use crate::color::Color;
use crate::logging::LoggingConfig;

/// Settings for an [`Application`](crate::Application) and its window.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Frame pacing target; 0 renders as fast as frames are requested.
    pub target_fps: u32,
    /// Query the context for errors after every call. Slow; meant for debugging.
    pub check_errors: bool,
    pub clear_color: Color,
    /// Drive the camera with an [`OrbitControl`](crate::OrbitControl) from touch input.
    pub orbit_control: bool,
    /// `env_logger` filter; `None` defers to `RUST_LOG`.
    pub log_filter: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "gles3d".to_string(),
            width: 750,
            height: 1334,
            target_fps: 60,
            check_errors: false,
            clear_color: Color::GRAY,
            orbit_control: true,
            log_filter: None,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn check_errors(mut self, enabled: bool) -> Self {
        self.check_errors = enabled;
        self
    }

    pub fn clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn orbit_control(mut self, enabled: bool) -> Self {
        self.orbit_control = enabled;
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            env_filter: self.log_filter.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_a_portrait_phone() {
        let config = AppConfig::new();
        assert_eq!((config.width, config.height), (750, 1334));
        assert_eq!(config.target_fps, 60);
        assert!(config.aspect() < 1.0);
        assert!(config.logging().env_filter.is_none());
    }

    #[test]
    fn builder_overrides() {
        let config = AppConfig::new()
            .title("demo")
            .size(800, 600)
            .check_errors(true)
            .orbit_control(false)
            .log_filter("gles3d=debug");
        assert_eq!(config.title, "demo");
        assert!(config.check_errors);
        assert!(!config.orbit_control);
        assert_eq!(config.logging().env_filter.as_deref(), Some("gles3d=debug"));
    }
}
