use std::fmt;

/// Build metadata baked in at compile time via `env!`, matching the
/// `CARGO_PKG_*` variables cargo always provides.
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
	pub version: &'static str,
	pub rust_version: &'static str,
	pub build_profile: &'static str,
}

impl BuildInfo {
	pub fn new() -> Self {
		Self {
			version: env!("CARGO_PKG_VERSION"),
			rust_version: option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown"),
			build_profile: if cfg!(debug_assertions) {
				"debug"
			} else {
				"release"
			},
		}
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for BuildInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"version.version: {}\nversion.rust_version: {}\nversion.build_profile: {}",
			self.version, self.rust_version, self.build_profile
		)
	}
}
