//! Build progress reporting; a no-op when the `progress` feature is disabled

#[cfg(feature = "progress")]
pub use indicatif::{ProgressBar, ProgressStyle};

#[cfg(not(feature = "progress"))]
pub use self::noop::*;

use std::time::Duration;

/// Strings between two progress updates
pub const REPORT_INTERVAL: u64 = 10_000;

/// Reports the number of strings inserted so far, on a spinner when enabled
/// and as plain stdout lines otherwise
pub struct BuildProgress {
    bar: Option<ProgressBar>,
    count: u64,
}

impl BuildProgress {
    pub fn new(spinner: bool) -> Self {
        let bar = spinner.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar.set_message("Number of strings: 0");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self { bar, count: 0 }
    }

    pub fn update(&mut self, count: u64) {
        self.count = count;
        match &self.bar {
            Some(bar) => bar.set_message(format!("Number of strings: {count}")),
            None => println!("Number of strings: {count}"),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!("Number of strings: {}", self.count));
        }
    }
}

#[cfg(not(feature = "progress"))]
mod noop {
    use std::time::Duration;

    #[derive(Clone)]
    pub struct ProgressBar;

    impl ProgressBar {
        pub fn new_spinner() -> Self {
            ProgressBar
        }

        pub fn set_style(&self, _style: ProgressStyle) {}
        pub fn set_message(&self, _msg: impl Into<std::borrow::Cow<'static, str>>) {}
        pub fn enable_steady_tick(&self, _interval: Duration) {}
        pub fn finish_with_message(&self, _msg: impl Into<std::borrow::Cow<'static, str>>) {}
    }

    pub struct ProgressStyle;

    impl ProgressStyle {
        pub fn default_spinner() -> Self {
            ProgressStyle
        }

        pub fn template(self, _template: &str) -> Result<Self, std::convert::Infallible> {
            Ok(self)
        }
    }
}
