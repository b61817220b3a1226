/// Conversions shared by every enum persisted as a `TEXT` status column.
///
/// The enum must provide `as_str(self) -> &'static str` and
/// `parse(&str) -> Option<Self>`. `TryFrom<String>` lets repository models
/// decode the column directly with `#[sqlx(try_from = "String")]`.
macro_rules! impl_text_status {
    ($name:ident, $label:literal) => {
        impl TryFrom<String> for $name {
            type Error = crate::error::CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value).ok_or_else(|| {
                    crate::error::CoreError::Internal(format!(
                        concat!("Unknown ", $label, " '{}'"),
                        value
                    ))
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
