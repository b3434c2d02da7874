use std::env;

/// Environment variable forcing read() I/O on the v4l2 back-end even when
/// the device advertises streaming.
pub const FORCE_READ_VAR: &str = "OPENIMAJ_GRABBER_READ";

/// Environment variable enabling verbose logging in the wrapped
/// videoInput-style library.
pub const VERBOSE_VAR: &str = "OPENIMAJ_GRABBER_VERBOSE";

/// Capture options, usually sourced from the process environment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Use read() I/O on the v4l2 back-end even if streaming is available
    pub force_read: bool,
    /// Ask the wrapped videoInput-style library to log verbosely
    pub verbose: bool,
}

impl Config {
    /// Reads the configuration from the environment.
    ///
    /// Both options are presence flags: any value (including the empty
    /// string) enables them.
    ///
    /// # Example
    ///
    /// ```
    /// use framegrab::Config;
    /// let config = Config::from_env();
    /// ```
    pub fn from_env() -> Self {
        Config {
            force_read: env::var_os(FORCE_READ_VAR).is_some(),
            verbose: env::var_os(VERBOSE_VAR).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_when_unset() {
        env::remove_var(FORCE_READ_VAR);
        env::remove_var(VERBOSE_VAR);
        assert_eq!(Config::from_env(), Config::default());
    }

    #[test]
    #[serial]
    fn force_read_from_env() {
        env::set_var(FORCE_READ_VAR, "1");
        env::remove_var(VERBOSE_VAR);
        let config = Config::from_env();
        env::remove_var(FORCE_READ_VAR);

        assert!(config.force_read);
        assert!(!config.verbose);
    }

    #[test]
    #[serial]
    fn verbose_accepts_any_value() {
        env::remove_var(FORCE_READ_VAR);
        env::set_var(VERBOSE_VAR, "");
        let config = Config::from_env();
        env::remove_var(VERBOSE_VAR);

        assert!(config.verbose);
    }
}
