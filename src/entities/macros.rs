//! Macros for reducing boilerplate when defining entities
//!
//! `impl_entity!` generates the struct together with the dynamic field
//! access the composer and the storage sessions rely on.

/// Define an entity struct and implement [`Entity`](crate::core::entity::Entity) for it
///
/// The key is always the `id` field and comes first. Conventions are opted
/// into by declaring the matching fields:
///
/// - `is_deleted: bool` + `deleted_at: Option<DateTime<Utc>>` enables soft delete
/// - `created_at: DateTime<Utc>` + `modified_at: Option<DateTime<Utc>>` enables auditing
/// - `row_version: i64` enables optimistic concurrency
///
/// Text fields may carry `#[max_length(n)]`, used for the column type.
///
/// # Example
///
/// ```rust,ignore
/// use gateway::prelude::*;
///
/// impl_entity!(
///     Invoice,
///     "invoice",
///     i64,
///     {
///         #[max_length(20)]
///         number: String,
///         total: f64,
///         is_deleted: bool,
///         deleted_at: Option<DateTime<Utc>>,
///     }
/// );
///
/// let invoice = Invoice { number: "F-001".into(), total: 99.5, ..Default::default() };
/// assert!(Invoice::capabilities().soft_delete);
/// ```
#[macro_export]
macro_rules! impl_entity {
    (
        $type:ident,
        $type_name:expr,
        $key:ty,
        {
            $( $(#[max_length($max:literal)])? $field:ident : $field_type:ty ),* $(,)?
        }
    ) => {
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $type {
            pub id: $key,
            $( pub $field: $field_type ),*
        }

        impl $crate::core::entity::Entity for $type {
            type Key = $key;

            fn resource_name() -> &'static str {
                $type_name
            }

            fn fields() -> &'static [$crate::core::field::FieldDef] {
                static FIELDS: &[$crate::core::field::FieldDef] = &[
                    $crate::core::field::FieldDef::of::<$key>("id"),
                    $(
                        $crate::core::field::FieldDef::of::<$field_type>(stringify!($field))
                            $( .with_max_length($max) )?
                    ),*
                ];
                FIELDS
            }

            fn capabilities() -> $crate::core::entity::Capabilities {
                static CAPABILITIES: ::std::sync::OnceLock<$crate::core::entity::Capabilities> =
                    ::std::sync::OnceLock::new();
                *CAPABILITIES.get_or_init(|| {
                    $crate::core::entity::Capabilities::detect(
                        <Self as $crate::core::entity::Entity>::fields(),
                    )
                })
            }

            fn id(&self) -> $key {
                self.id.clone()
            }

            fn set_id(&mut self, id: $key) {
                self.id = id;
            }

            fn field_value(&self, field: &str) -> Option<$crate::core::field::FieldValue> {
                use $crate::core::field::FieldType;
                match field {
                    "id" => Some(self.id.to_field_value()),
                    $( stringify!($field) => Some(self.$field.to_field_value()), )*
                    _ => None,
                }
            }

            fn set_field_value(
                &mut self,
                field: &str,
                value: $crate::core::field::FieldValue,
            ) -> bool {
                use $crate::core::field::FieldType;
                match field {
                    "id" => match <$key as FieldType>::from_field_value(value) {
                        Some(v) => {
                            self.id = v;
                            true
                        }
                        None => false,
                    },
                    $(
                        stringify!($field) => match <$field_type as FieldType>::from_field_value(value) {
                            Some(v) => {
                                self.$field = v;
                                true
                            }
                            None => false,
                        },
                    )*
                    _ => false,
                }
            }
        }
    };
}
