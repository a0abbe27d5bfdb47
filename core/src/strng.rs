//! A cheaply-cloneable interned-ish string, aliasing `arcstr::ArcStr`.
//!
//! Used pervasively for values that are cloned into many short-lived structs
//! per request (provider tags, model ids, policy ids, host names) where an
//! `Arc<str>`-style clone is much cheaper than `String::clone`.

pub type Strng = arcstr::ArcStr;

/// Build a [`Strng`] from anything that can be turned into a `&str`.
pub fn new(s: impl AsRef<str>) -> Strng {
	arcstr::ArcStr::from(s.as_ref())
}

/// Build a [`Strng`] from a `'static` string literal with no allocation.
#[macro_export]
macro_rules! strng {
	($lit:expr) => {
		$crate::strng::literal($lit)
	};
}

pub const fn literal(s: &'static str) -> Strng {
	arcstr::ArcStr::new(s)
}
