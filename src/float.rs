use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the real types a graph can be evaluated over (`f32`, `f64`).
///
/// Bundles the numeric and utility traits the numeric and code emission
/// passes rely on. `Send + Sync` lets functions and graphs be shared
/// across evaluation threads.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// Name of the matching C type, used when no override is configured.
    const C_TYPE: &'static str;
}

impl Float for f32 {
    const C_TYPE: &'static str = "float";
}

impl Float for f64 {
    const C_TYPE: &'static str = "double";
}
