//! Optional-field conventions for boundary payloads.
//!
//! A field the native protocol may omit is never given a sentinel value:
//!
//! - strings are `Option<&'a str>`, borrowed from the producer and valid only
//!   while the payload is visible (`None` is the null pointer);
//! - `Copy` scalars and timestamps are `Option<T>`;
//! - byte payloads are a [`Buffer`](crate::Buffer), empty when absent.
//!
//! Consumers branch on presence; absence is not an error.

/// Lend a present field to a payload without copying it.
#[inline]
pub fn lend<T>(field: &Option<T>) -> Option<&T> {
    field.as_ref()
}

#[inline]
pub fn lend_str(field: &Option<String>) -> Option<&str> {
    field.as_deref()
}

/// Copy `source` into `target` when present, leaving `target` alone otherwise.
#[inline]
pub fn overlay<T>(target: &mut Option<T>, source: Option<T>) {
    if let Some(value) = source {
        *target = Some(value);
    }
}

#[inline]
pub fn overlay_str(target: &mut Option<String>, source: Option<&str>) {
    if let Some(value) = source {
        *target = Some(value.to_owned());
    }
}

/// Reports which optional fields of a payload are present.
pub trait Presence {
    /// Names of present optional fields, in declaration order.
    fn present_fields(&self) -> Vec<&'static str>;
}

/// Implement [`Presence`] for a struct whose listed fields are all `Option`s.
#[macro_export]
macro_rules! impl_presence {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::optional::Presence for $ty {
            fn present_fields(&self) -> Vec<&'static str> {
                let mut present = Vec::new();
                $(
                    if self.$field.is_some() {
                        present.push(stringify!($field));
                    }
                )+
                present
            }
        }
    };
}
