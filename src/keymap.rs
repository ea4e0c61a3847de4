//! Raw key code to canonical name mapping.
//!
//! Codes follow the virtual key code layout delivered by the input hook
//! collaborator. Unmapped codes resolve to `"unknown"` so no input event
//! is ever dropped for lack of a name.

use crate::event::Modifiers;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Modifier bits in the raw flags word delivered with keyboard callbacks.
pub mod flags {
    pub const CAPS_LOCK: u64 = 1 << 16;
    pub const SHIFT: u64 = 1 << 17;
    pub const CONTROL: u64 = 1 << 18;
    pub const OPTION: u64 = 1 << 19;
    pub const COMMAND: u64 = 1 << 20;
    pub const FUNCTION: u64 = 1 << 23;
}

static KEY_CODE_MAP: Lazy<HashMap<u32, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (0, "a"),
        (1, "s"),
        (2, "d"),
        (3, "f"),
        (4, "h"),
        (5, "g"),
        (6, "z"),
        (7, "x"),
        (8, "c"),
        (9, "v"),
        (11, "b"),
        (12, "q"),
        (13, "w"),
        (14, "e"),
        (15, "r"),
        (16, "y"),
        (17, "t"),
        (18, "1"),
        (19, "2"),
        (20, "3"),
        (21, "4"),
        (22, "6"),
        (23, "5"),
        (24, "="),
        (25, "9"),
        (26, "7"),
        (27, "-"),
        (28, "8"),
        (29, "0"),
        (30, "]"),
        (31, "o"),
        (32, "u"),
        (33, "["),
        (34, "i"),
        (35, "p"),
        (36, "Return"),
        (37, "l"),
        (38, "j"),
        (39, "'"),
        (40, "k"),
        (41, ";"),
        (42, "\\"),
        (43, ","),
        (44, "/"),
        (45, "n"),
        (46, "m"),
        (47, "."),
        (48, "Tab"),
        (49, "Space"),
        (50, "`"),
        (51, "Delete"),
        (53, "Escape"),
        (55, "Command"),
        (56, "Shift"),
        (57, "Caps Lock"),
        (58, "Option"),
        (59, "Control"),
        (60, "Right Shift"),
        (61, "Right Option"),
        (62, "Right Control"),
        (63, "Function"),
        (96, "F5"),
        (97, "F6"),
        (98, "F7"),
        (99, "F3"),
        (100, "F8"),
        (101, "F9"),
        (103, "F11"),
        (105, "F13"),
        (106, "F16"),
        (107, "F14"),
        (109, "F10"),
        (111, "F12"),
        (113, "F15"),
        (114, "Help"),
        (115, "Home"),
        (116, "Page Up"),
        (117, "Forward Delete"),
        (118, "F4"),
        (119, "End"),
        (120, "F2"),
        (121, "Page Down"),
        (122, "F1"),
        (123, "Left Arrow"),
        (124, "Right Arrow"),
        (125, "Down Arrow"),
        (126, "Up Arrow"),
    ])
});

/// Canonical name for a raw key code, `"unknown"` for unmapped codes.
pub fn key_name(code: u32) -> &'static str {
    KEY_CODE_MAP.get(&code).copied().unwrap_or("unknown")
}

/// Whether a canonical key name is a printable character (as opposed to a
/// control, function, or modifier key).
pub fn is_printable(name: &str) -> bool {
    let mut chars = name.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_control())
}

/// Parses the raw modifier flags word into modifier state.
pub fn parse_modifier_flags(raw: u64) -> Modifiers {
    Modifiers {
        shift: raw & flags::SHIFT != 0,
        control: raw & flags::CONTROL != 0,
        option: raw & flags::OPTION != 0,
        command: raw & flags::COMMAND != 0,
        function: raw & flags::FUNCTION != 0,
        capslock: raw & flags::CAPS_LOCK != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(key_name(0), "a");
        assert_eq!(key_name(36), "Return");
        assert_eq!(key_name(49), "Space");
        assert_eq!(key_name(126), "Up Arrow");
    }

    #[test]
    fn test_unknown_code_is_not_dropped() {
        assert_eq!(key_name(999), "unknown");
        assert_eq!(key_name(10), "unknown"); // gap in the table
    }

    #[test]
    fn test_printable_classification() {
        assert!(is_printable("a"));
        assert!(is_printable("="));
        assert!(!is_printable("Return"));
        assert!(!is_printable("unknown"));
    }

    #[test]
    fn test_parse_modifier_flags() {
        let mods = parse_modifier_flags(flags::SHIFT | flags::COMMAND);
        assert!(mods.shift);
        assert!(mods.command);
        assert!(!mods.control);
        assert!(!mods.capslock);

        assert_eq!(parse_modifier_flags(0), Modifiers::default());
    }
}
