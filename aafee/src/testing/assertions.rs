//! Assertions on stage values.

use crate::core::{ControlSignal, StageValue};

/// Asserts that the value renders to exactly `expected`.
pub fn assert_text(value: &StageValue, expected: &str) {
    match value.as_text() {
        Ok(text) => assert_eq!(
            text, expected,
            "Expected text {expected:?}, got {text:?}"
        ),
        Err(err) => panic!("Expected text {expected:?}, but {err}"),
    }
}

/// Asserts that the value renders to text containing `needle`.
pub fn assert_text_contains(value: &StageValue, needle: &str) {
    let text = value
        .as_text()
        .unwrap_or_else(|err| panic!("Expected text containing {needle:?}, but {err}"));
    assert!(
        text.contains(needle),
        "Expected text to contain {needle:?}, got {text:?}"
    );
}

/// Asserts the variant by name (`"text"`, `"instruction"`, ...).
pub fn assert_variant(value: &StageValue, expected: &str) {
    assert_eq!(
        value.variant_name(),
        expected,
        "Expected a {} value, got {:?}",
        expected,
        value
    );
}

/// Asserts that the value is a continue instruction.
pub fn assert_continue(value: &StageValue) {
    assert_control(value, ControlSignal::Continue);
}

/// Asserts that the value is an end instruction.
pub fn assert_end(value: &StageValue) {
    assert_control(value, ControlSignal::End);
}

fn assert_control(value: &StageValue, expected: ControlSignal) {
    let control = value.instruction().map(|i| i.control);
    assert_eq!(
        control,
        Some(expected),
        "Expected a {expected} instruction, got {value:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Instruction;

    #[test]
    fn test_assert_text() {
        assert_text(&StageValue::markdown("# hi"), "# hi");
        assert_text(&StageValue::List(vec!["a".into()]), "[a]");
    }

    #[test]
    #[should_panic(expected = "not text representable")]
    fn test_assert_text_fails_on_none() {
        assert_text(&StageValue::None, "");
    }

    #[test]
    fn test_assert_text_contains() {
        assert_text_contains(&Instruction::proceed("ask more").into(), "more");
    }

    #[test]
    fn test_assert_variant() {
        assert_variant(&StageValue::json("{}"), "json");
    }

    #[test]
    fn test_assert_control() {
        assert_continue(&Instruction::proceed("a").into());
        assert_end(&Instruction::end("b").into());
    }

    #[test]
    #[should_panic(expected = "Expected a END instruction")]
    fn test_assert_end_fails_on_text() {
        assert_end(&StageValue::text("plain"));
    }
}
