//! Internal events: metric handles registered once per generator, emitted on the hot path.
//!
//! No recorder is installed here. Without one every emit is a no-op apart from logging.

mod load_generator;

pub use load_generator::*;

/// Declares an event struct holding pre-registered metric handles.
///
/// ```ignore
/// registered_event! {
///     MyEvent => {
///         total: Counter = counter!("my_total"),
///     }
///
///     fn emit(&self, n: u64) {
///         self.total.increment(n);
///     }
/// }
/// ```
///
/// Handles bind to the recorder that is current when `MyEvent::register()` runs.
#[macro_export]
macro_rules! registered_event {
    (
        $event:ident => {
            $( $field:ident: $type:ty = $value:expr, )*
        }

        fn emit(&$slf:ident $(, $arg:ident: $arg_ty:ty )* $(,)?) $emit_body:block
    ) => {
        #[derive(Clone)]
        pub struct $event {
            $( pub $field: $type, )*
        }

        impl $event {
            pub fn register() -> Self {
                Self {
                    $( $field: $value, )*
                }
            }

            pub fn emit(&$slf $(, $arg: $arg_ty )*) $emit_body
        }

        impl std::fmt::Debug for $event {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(stringify!($event))
            }
        }
    };
}
