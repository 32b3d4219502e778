/// Wire event name for an enum variant. Variants are single words, so the
/// mapping is a plain lowercase ("Start" -> "start").
pub fn variant_to_event_name(s: &str) -> String {
    s.to_lowercase()
}

/// Define an SSE event enum with automatic `event_name()` / `data()` helpers
/// and a conversion into `axum::response::sse::Event`.
///
/// The wire event name is the lowercased variant name; the `data:` payload
/// is the serialized variant content.
#[macro_export]
macro_rules! sse_event_enum {
    (
        $(#[$attr:meta])*
        $vis:vis enum $enum_name:ident {
            $($variant:ident($data_type:ty)),+ $(,)?
        }
    ) => {
        $(#[$attr])*
        $vis enum $enum_name {
            $($variant($data_type),)+
        }

        impl $enum_name {
            pub fn event_name(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant(_) => {
                            static EVENT_NAME: std::sync::OnceLock<String> =
                                std::sync::OnceLock::new();
                            EVENT_NAME.get_or_init(|| {
                                $crate::api::macros::variant_to_event_name(stringify!($variant))
                            })
                        },
                    )+
                }
            }

            pub fn data(&self) -> serde_json::Value {
                match self {
                    $(
                        Self::$variant(data) => {
                            serde_json::to_value(data).unwrap_or(serde_json::Value::Null)
                        },
                    )+
                }
            }
        }

        impl From<$enum_name> for axum::response::sse::Event {
            fn from(event: $enum_name) -> Self {
                axum::response::sse::Event::default()
                    .event(event.event_name())
                    .data(event.data().to_string())
            }
        }
    };
}
