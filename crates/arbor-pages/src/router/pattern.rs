//! Route path patterns and path normalization.
//!
//! Patterns embed parameters as `${name}` placeholders:
//!
//! - `/users` - exact match
//! - `/users/${id}` - one parameter, matches a single segment
//! - `/users/${id}/posts/${post}` - parameters ordered left to right
//!
//! Parameter names map 1:1, in order, to the capture groups of the compiled
//! expression.

use crate::error::RouterError;
use std::collections::HashMap;
use std::fmt;

/// Maximum allowed length for a route pattern string in bytes.
const MAX_PATTERN_LENGTH: usize = 1024;

/// Maximum allowed number of path segments in a route pattern.
const MAX_PATH_SEGMENTS: usize = 32;

/// Maximum allowed size for a compiled pattern regex (in bytes).
const MAX_REGEX_SIZE: usize = 1 << 20; // 1 MiB

/// Normalizes a route or request path.
///
/// Repeated separators collapse, a leading `/` is ensured and a trailing `/`
/// is dropped except for the root.
///
/// # Examples
///
/// ```
/// use arbor_pages::router::normalize_path;
///
/// assert_eq!(normalize_path("users//42/"), "/users/42");
/// assert_eq!(normalize_path(""), "/");
/// ```
pub fn normalize_path(path: &str) -> String {
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	format!("/{}", segments.join("/"))
}

/// Joins a parent route path and a child segment, then normalizes.
pub fn join_paths(parent: &str, child: &str) -> String {
	normalize_path(&format!("{}/{}", parent, child))
}

/// A compiled `${param}` route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
	pattern: String,
	regex: regex::Regex,
	param_names: Vec<String>,
}

impl RoutePattern {
	/// Compiles `pattern`.
	///
	/// # Errors
	///
	/// Returns [`RouterError::InvalidPattern`] if the pattern exceeds 1024
	/// bytes, has more than 32 segments, has an unterminated or empty
	/// placeholder, or fails to compile.
	pub fn new(pattern: &str) -> Result<Self, RouterError> {
		let invalid = |message: String| RouterError::InvalidPattern {
			pattern: pattern.to_string(),
			message,
		};

		if pattern.len() > MAX_PATTERN_LENGTH {
			return Err(invalid(format!(
				"length {} exceeds maximum allowed length of {} bytes",
				pattern.len(),
				MAX_PATTERN_LENGTH
			)));
		}
		let segment_count = pattern.split('/').count();
		if segment_count > MAX_PATH_SEGMENTS {
			return Err(invalid(format!(
				"{} path segments, exceeding maximum of {}",
				segment_count, MAX_PATH_SEGMENTS
			)));
		}

		let (regex_str, param_names) = Self::compile(pattern).map_err(invalid)?;
		let regex = regex::RegexBuilder::new(&regex_str)
			.size_limit(MAX_REGEX_SIZE)
			.build()
			.map_err(|e| invalid(e.to_string()))?;

		Ok(Self {
			pattern: pattern.to_string(),
			regex,
			param_names,
		})
	}

	fn compile(pattern: &str) -> Result<(String, Vec<String>), String> {
		let mut regex_str = String::from("^");
		let mut param_names = Vec::new();
		let mut rest = pattern;

		while let Some(start) = rest.find("${") {
			regex_str.push_str(&regex::escape(&rest[..start]));
			let after = &rest[start + 2..];
			let Some(end) = after.find('}') else {
				return Err("unterminated placeholder".to_string());
			};
			let name = after[..end].trim();
			if name.is_empty() {
				return Err("empty placeholder name".to_string());
			}
			param_names.push(name.to_string());
			regex_str.push_str("([^/]+)");
			rest = &after[end + 1..];
		}
		regex_str.push_str(&regex::escape(rest));
		regex_str.push('$');
		Ok((regex_str, param_names))
	}

	/// Whether `pattern` contains a `${...}` placeholder.
	pub fn is_dynamic(pattern: &str) -> bool {
		pattern.contains("${")
	}

	/// The original pattern string.
	pub fn pattern(&self) -> &str {
		&self.pattern
	}

	/// Parameter names in order of appearance.
	pub fn param_names(&self) -> &[String] {
		&self.param_names
	}

	/// Extracts parameters if `path` matches.
	pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
		let caps = self.regex.captures(path)?;
		Some(
			self.param_names
				.iter()
				.enumerate()
				.filter_map(|(i, name)| {
					caps.get(i + 1)
						.map(|m| (name.clone(), m.as_str().to_string()))
				})
				.collect(),
		)
	}

	/// Whether `path` matches.
	pub fn is_match(&self, path: &str) -> bool {
		self.regex.is_match(path)
	}
}

impl PartialEq for RoutePattern {
	fn eq(&self, other: &Self) -> bool {
		self.pattern == other.pattern
	}
}

impl Eq for RoutePattern {}

impl fmt::Display for RoutePattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.pattern)
	}
}

/// Substitutes `${name}` placeholders in `pattern` with `params`.
///
/// A missing parameter is replaced by its own name rather than failing.
pub fn substitute(pattern: &str, params: &HashMap<String, String>) -> String {
	let mut out = String::with_capacity(pattern.len());
	let mut rest = pattern;
	while let Some(start) = rest.find("${") {
		out.push_str(&rest[..start]);
		let after = &rest[start + 2..];
		let Some(end) = after.find('}') else {
			out.push_str(&rest[start..]);
			return out;
		};
		let name = after[..end].trim();
		match params.get(name) {
			Some(value) => out.push_str(value),
			None => out.push_str(name),
		}
		rest = &after[end + 1..];
	}
	out.push_str(rest);
	out
}
