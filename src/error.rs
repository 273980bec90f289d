use std::error::Error as StdError;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised while declaring properties on a [`SchemaBuilder`](crate::SchemaBuilder).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
	#[error("`{property}` depends on `{dependency}`, which is not a declared property")]
	UnknownProperty { property: String, dependency: String },

	#[error("`{0}` is already registered")]
	DuplicateRegistration(String),

	#[error("`{property}` would form a dependency cycle: {}", .path.join(" -> "))]
	CyclicDependency { property: String, path: Vec<String> },

	#[error("computed property `{0}` was declared but never defined")]
	Undefined(String),

	#[error("handle for property #{0} belongs to another schema")]
	ForeignHandle(u32),
}

/// Errors raised when a property is looked up by name.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LookupError {
	#[error("no property named `{0}`")]
	UnknownProperty(String),

	#[error("property `{property}` does not hold a value of type `{expected}`")]
	TypeMismatch {
		property: String,
		expected: &'static str,
	},

	#[error("property `{0}` is computed and cannot be set")]
	NotSettable(String),

	#[error("property `{0}` is a base property")]
	NotComputed(String),
}

/// A failure inside a listener. These never reach the writer; they are
/// handed to the object's `on_listener_error` hook instead.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
	#[error("listener panicked while handling `{property}`: {message}")]
	Panicked { property: String, message: String },

	#[error("listener failed while handling `{property}`")]
	Failed {
		property: String,
		#[source]
		source: BoxError,
	},
}

impl ListenerError {
	pub fn property(&self) -> &str {
		match self {
			ListenerError::Panicked { property, .. } => property,
			ListenerError::Failed { property, .. } => property,
		}
	}
}
