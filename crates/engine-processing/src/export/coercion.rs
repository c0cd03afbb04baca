use model::core::{column::Column, value::Value};

/// Renders one cell for the CSV file. `None` is written as an empty,
/// unquoted field, which the warehouse loads as NULL.
///
/// - exact numerics keep every digit (`Value::Decimal` is never routed
///   through floating point);
/// - fixed-length character values lose their trailing padding, and a value
///   that is empty afterwards becomes NULL;
/// - NUL characters are removed, the warehouse rejects them.
pub fn coerce(column: &Column, value: Option<&Value>) -> Option<String> {
    let text = value?.as_string()?;

    if column.is_fixed_char() {
        let trimmed = text.trim_end();
        if trimmed.is_empty() {
            return None;
        }
        return Some(strip_nul(trimmed));
    }

    Some(strip_nul(&text))
}

fn strip_nul(text: &str) -> String {
    if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn decimals_keep_every_digit() {
        let column = Column::new("amount", "numeric");
        let raw = "98765432109876543210.0123456789";
        let value = Value::Decimal(BigDecimal::from_str(raw).unwrap());
        assert_eq!(coerce(&column, Some(&value)).as_deref(), Some(raw));
    }

    #[test]
    fn fixed_char_is_trimmed_and_blank_becomes_null() {
        let column = Column::new("code", "char");
        let padded = Value::String("AB   ".into());
        let blank = Value::String("    ".into());
        assert_eq!(coerce(&column, Some(&padded)).as_deref(), Some("AB"));
        assert_eq!(coerce(&column, Some(&blank)), None);
        assert_eq!(coerce(&column, None), None);
    }

    #[test]
    fn variable_text_keeps_padding_but_loses_nul() {
        let column = Column::new("note", "varchar");
        let value = Value::String("a\0b  ".into());
        assert_eq!(coerce(&column, Some(&value)).as_deref(), Some("ab  "));
    }

    #[test]
    fn null_stays_null() {
        let column = Column::new("note", "text");
        assert_eq!(coerce(&column, Some(&Value::Null)), None);
    }
}
