//! Lookup tables between Tizen key data and Flutter key codes
//!
//! Physical keys are keyed by XKB scan code (evdev code + 8) and resolve to
//! Flutter's USB HID based physical key codes. Logical keys are keyed by the
//! Tizen key symbol. The GTK tables only feed the legacy `flutter/keyevent`
//! message and go away together with it.

use std::{collections::HashMap, sync::OnceLock};

/// Mask for the 32-bit value portion of a key code.
pub const VALUE_MASK: u64 = 0x000ffffffff;

/// Plane for private keys defined by the Tizen platform.
pub const TIZEN_PLANE: u64 = 0x02000000000;

// Ecore_Input modifier bits.
const ECORE_MODIFIER_SHIFT: u32 = 0x0001;
const ECORE_MODIFIER_CTRL: u32 = 0x0002;
const ECORE_MODIFIER_ALT: u32 = 0x0004;
const ECORE_MODIFIER_WIN: u32 = 0x0008;
const ECORE_MODIFIER_NUM: u32 = 0x0020;
const ECORE_MODIFIER_CAPS: u32 = 0x0040;

// GdkModifierType bits, as expected by the framework's GtkKeyHelper.
const GTK_SHIFT_MASK: i32 = 1 << 0;
const GTK_LOCK_MASK: i32 = 1 << 1;
const GTK_CONTROL_MASK: i32 = 1 << 2;
const GTK_MOD1_MASK: i32 = 1 << 3;
const GTK_MOD2_MASK: i32 = 1 << 4;
const GTK_META_MASK: i32 = 1 << 28;

const ECORE_TO_GTK_MODIFIERS: &[(u32, i32)] = &[
    (ECORE_MODIFIER_SHIFT, GTK_SHIFT_MASK),
    (ECORE_MODIFIER_CAPS, GTK_LOCK_MASK),
    (ECORE_MODIFIER_CTRL, GTK_CONTROL_MASK),
    (ECORE_MODIFIER_ALT, GTK_MOD1_MASK),
    (ECORE_MODIFIER_NUM, GTK_MOD2_MASK),
    (ECORE_MODIFIER_WIN, GTK_META_MASK),
];

/// (XKB scan code, Flutter physical key, GTK key code)
const SCAN_CODES: &[(u32, u64, u32)] = &[
    (0x09, 0x00070029, 0xff1b), // Escape
    (0x0a, 0x0007001e, 0x0031), // Digit1
    (0x0b, 0x0007001f, 0x0032), // Digit2
    (0x0c, 0x00070020, 0x0033), // Digit3
    (0x0d, 0x00070021, 0x0034), // Digit4
    (0x0e, 0x00070022, 0x0035), // Digit5
    (0x0f, 0x00070023, 0x0036), // Digit6
    (0x10, 0x00070024, 0x0037), // Digit7
    (0x11, 0x00070025, 0x0038), // Digit8
    (0x12, 0x00070026, 0x0039), // Digit9
    (0x13, 0x00070027, 0x0030), // Digit0
    (0x14, 0x0007002d, 0x002d), // Minus
    (0x15, 0x0007002e, 0x003d), // Equal
    (0x16, 0x0007002a, 0xff08), // Backspace
    (0x17, 0x0007002b, 0xff09), // Tab
    (0x18, 0x00070014, 0x0071), // KeyQ
    (0x19, 0x0007001a, 0x0077), // KeyW
    (0x1a, 0x00070008, 0x0065), // KeyE
    (0x1b, 0x00070015, 0x0072), // KeyR
    (0x1c, 0x00070017, 0x0074), // KeyT
    (0x1d, 0x0007001c, 0x0079), // KeyY
    (0x1e, 0x00070018, 0x0075), // KeyU
    (0x1f, 0x0007000c, 0x0069), // KeyI
    (0x20, 0x00070012, 0x006f), // KeyO
    (0x21, 0x00070013, 0x0070), // KeyP
    (0x22, 0x0007002f, 0x005b), // BracketLeft
    (0x23, 0x00070030, 0x005d), // BracketRight
    (0x24, 0x00070028, 0xff0d), // Enter
    (0x25, 0x000700e0, 0xffe3), // ControlLeft
    (0x26, 0x00070004, 0x0061), // KeyA
    (0x27, 0x00070016, 0x0073), // KeyS
    (0x28, 0x00070007, 0x0064), // KeyD
    (0x29, 0x00070009, 0x0066), // KeyF
    (0x2a, 0x0007000a, 0x0067), // KeyG
    (0x2b, 0x0007000b, 0x0068), // KeyH
    (0x2c, 0x0007000d, 0x006a), // KeyJ
    (0x2d, 0x0007000e, 0x006b), // KeyK
    (0x2e, 0x0007000f, 0x006c), // KeyL
    (0x2f, 0x00070033, 0x003b), // Semicolon
    (0x30, 0x00070034, 0x0027), // Quote
    (0x31, 0x00070035, 0x0060), // Backquote
    (0x32, 0x000700e1, 0xffe1), // ShiftLeft
    (0x33, 0x00070031, 0x005c), // Backslash
    (0x34, 0x0007001d, 0x007a), // KeyZ
    (0x35, 0x0007001b, 0x0078), // KeyX
    (0x36, 0x00070006, 0x0063), // KeyC
    (0x37, 0x00070019, 0x0076), // KeyV
    (0x38, 0x00070005, 0x0062), // KeyB
    (0x39, 0x00070011, 0x006e), // KeyN
    (0x3a, 0x00070010, 0x006d), // KeyM
    (0x3b, 0x00070036, 0x002c), // Comma
    (0x3c, 0x00070037, 0x002e), // Period
    (0x3d, 0x00070038, 0x002f), // Slash
    (0x3e, 0x000700e5, 0xffe2), // ShiftRight
    (0x3f, 0x00070055, 0xffaa), // NumpadMultiply
    (0x40, 0x000700e2, 0xffe9), // AltLeft
    (0x41, 0x0007002c, 0x0020), // Space
    (0x42, 0x00070039, 0xffe5), // CapsLock
    (0x43, 0x0007003a, 0xffbe), // F1
    (0x44, 0x0007003b, 0xffbf), // F2
    (0x45, 0x0007003c, 0xffc0), // F3
    (0x46, 0x0007003d, 0xffc1), // F4
    (0x47, 0x0007003e, 0xffc2), // F5
    (0x48, 0x0007003f, 0xffc3), // F6
    (0x49, 0x00070040, 0xffc4), // F7
    (0x4a, 0x00070041, 0xffc5), // F8
    (0x4b, 0x00070042, 0xffc6), // F9
    (0x4c, 0x00070043, 0xffc7), // F10
    (0x4d, 0x00070053, 0xff7f), // NumLock
    (0x4e, 0x00070047, 0xff14), // ScrollLock
    (0x4f, 0x0007005f, 0xffb7), // Numpad7
    (0x50, 0x00070060, 0xffb8), // Numpad8
    (0x51, 0x00070061, 0xffb9), // Numpad9
    (0x52, 0x00070056, 0xffad), // NumpadSubtract
    (0x53, 0x0007005c, 0xffb4), // Numpad4
    (0x54, 0x0007005d, 0xffb5), // Numpad5
    (0x55, 0x0007005e, 0xffb6), // Numpad6
    (0x56, 0x00070057, 0xffab), // NumpadAdd
    (0x57, 0x00070059, 0xffb1), // Numpad1
    (0x58, 0x0007005a, 0xffb2), // Numpad2
    (0x59, 0x0007005b, 0xffb3), // Numpad3
    (0x5a, 0x00070062, 0xffb0), // Numpad0
    (0x5b, 0x00070063, 0xffae), // NumpadDecimal
    (0x5f, 0x00070044, 0xffc8), // F11
    (0x60, 0x00070045, 0xffc9), // F12
    (0x68, 0x00070058, 0xff8d), // NumpadEnter
    (0x69, 0x000700e4, 0xffe4), // ControlRight
    (0x6a, 0x00070054, 0xffaf), // NumpadDivide
    (0x6b, 0x00070046, 0xff61), // PrintScreen
    (0x6c, 0x000700e6, 0xffea), // AltRight
    (0x6e, 0x0007004a, 0xff50), // Home
    (0x6f, 0x00070052, 0xff52), // ArrowUp
    (0x70, 0x0007004b, 0xff55), // PageUp
    (0x71, 0x00070050, 0xff51), // ArrowLeft
    (0x72, 0x0007004f, 0xff53), // ArrowRight
    (0x73, 0x0007004d, 0xff57), // End
    (0x74, 0x00070051, 0xff54), // ArrowDown
    (0x75, 0x0007004e, 0xff56), // PageDown
    (0x76, 0x00070049, 0xff63), // Insert
    (0x77, 0x0007004c, 0xffff), // Delete
    (0x79, 0x0007007f, 0x1008ff12), // AudioVolumeMute
    (0x7a, 0x00070081, 0x1008ff11), // AudioVolumeDown
    (0x7b, 0x00070080, 0x1008ff13), // AudioVolumeUp
    (0x7f, 0x00070048, 0xff13), // Pause
    (0x85, 0x000700e3, 0xffeb), // MetaLeft
    (0x86, 0x000700e7, 0xffec), // MetaRight
    (0x87, 0x00070065, 0xff67), // ContextMenu
    (0xa6, 0x000c0224, 0x1008ff26), // BrowserBack
    (0xac, 0x000c00cd, 0x1008ff14), // MediaPlayPause
];

/// Named (non-character) Tizen key symbols.
const NAMED_SYMBOLS: &[(&str, u64)] = &[
    ("BackSpace", 0x00100000008),
    ("Tab", 0x00100000009),
    ("Return", 0x0010000000d),
    ("Escape", 0x0010000001b),
    ("Delete", 0x0010000007f),
    ("Caps_Lock", 0x00100000104),
    ("Num_Lock", 0x0010000010a),
    ("Scroll_Lock", 0x0010000010c),
    ("Down", 0x00100000301),
    ("Left", 0x00100000302),
    ("Right", 0x00100000303),
    ("Up", 0x00100000304),
    ("End", 0x00100000305),
    ("Home", 0x00100000306),
    ("Next", 0x00100000307),
    ("Prior", 0x00100000308),
    ("Insert", 0x00100000407),
    ("Menu", 0x00100000505),
    ("Pause", 0x00100000509),
    ("Print", 0x00100000608),
    ("F1", 0x00100000801),
    ("F2", 0x00100000802),
    ("F3", 0x00100000803),
    ("F4", 0x00100000804),
    ("F5", 0x00100000805),
    ("F6", 0x00100000806),
    ("F7", 0x00100000807),
    ("F8", 0x00100000808),
    ("F9", 0x00100000809),
    ("F10", 0x0010000080a),
    ("F11", 0x0010000080b),
    ("F12", 0x0010000080c),
    ("XF86AudioLowerVolume", 0x00100000a0f),
    ("XF86AudioRaiseVolume", 0x00100000a10),
    ("XF86AudioMute", 0x00100000a11),
    ("XF86Back", 0x00100000c01),
    ("XF86AudioPlay", 0x00100000d2e),
    ("Control_L", 0x00200000100),
    ("Control_R", 0x00200000101),
    ("Shift_L", 0x00200000102),
    ("Shift_R", 0x00200000103),
    ("Alt_L", 0x00200000104),
    ("Alt_R", 0x00200000105),
    ("Super_L", 0x00200000106),
    ("Super_R", 0x00200000107),
    ("KP_Enter", 0x0020000020d),
    ("KP_Multiply", 0x0020000022a),
    ("KP_Add", 0x0020000022b),
    ("KP_Subtract", 0x0020000022d),
    ("KP_Decimal", 0x0020000022e),
    ("KP_Divide", 0x0020000022f),
    ("KP_0", 0x00200000230),
    ("KP_1", 0x00200000231),
    ("KP_2", 0x00200000232),
    ("KP_3", 0x00200000233),
    ("KP_4", 0x00200000234),
    ("KP_5", 0x00200000235),
    ("KP_6", 0x00200000236),
    ("KP_7", 0x00200000237),
    ("KP_8", 0x00200000238),
    ("KP_9", 0x00200000239),
    ("space", 0x00000000020),
    ("minus", 0x0000000002d),
    ("equal", 0x0000000003d),
    ("bracketleft", 0x0000000005b),
    ("bracketright", 0x0000000005d),
    ("semicolon", 0x0000000003b),
    ("apostrophe", 0x00000000027),
    ("grave", 0x00000000060),
    ("backslash", 0x0000000005c),
    ("comma", 0x0000000002c),
    ("period", 0x0000000002e),
    ("slash", 0x0000000002f),
];

/// Keys emitted by the software keyboard with a zero scan code.
const FALLBACK_SCAN_CODES: &[(&str, u32)] = &[
    ("BackSpace", 0x00000016),
    ("Up", 0x0000006f),
    ("Left", 0x00000071),
    ("Right", 0x00000072),
    ("Down", 0x00000074),
];

struct ScanCodeEntry {
    physical: u64,
    gtk_key_code: u32,
}

fn scan_code_table() -> &'static HashMap<u32, ScanCodeEntry> {
    static TABLE: OnceLock<HashMap<u32, ScanCodeEntry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        SCAN_CODES
            .iter()
            .map(|&(scan_code, physical, gtk_key_code)| {
                (
                    scan_code,
                    ScanCodeEntry {
                        physical,
                        gtk_key_code,
                    },
                )
            })
            .collect()
    })
}

fn symbol_table() -> &'static HashMap<&'static str, u64> {
    static TABLE: OnceLock<HashMap<&'static str, u64>> = OnceLock::new();
    TABLE.get_or_init(|| NAMED_SYMBOLS.iter().copied().collect())
}

/// Moves the value part of `id` into `plane`.
pub fn apply_plane(id: u64, plane: u64) -> u64 {
    (id & VALUE_MASK) | plane
}

/// Resolves the Flutter physical key for a scan code.
///
/// Unknown scan codes are placed in the Tizen plane so that distinct hardware
/// keys still get distinct physical keys.
pub fn physical_key_for_scan_code(scan_code: u32) -> u64 {
    scan_code_table()
        .get(&scan_code)
        .map(|entry| entry.physical)
        .unwrap_or_else(|| apply_plane(u64::from(scan_code), TIZEN_PLANE))
}

/// Resolves the Flutter logical key for a Tizen key symbol.
///
/// Single ASCII letters and digits map onto their unicode plane value, with
/// letters folded to lower case as the framework expects.
pub fn logical_key_for_symbol(symbol: &str) -> u64 {
    if let Some(&logical) = symbol_table().get(symbol) {
        return logical;
    }
    let mut chars = symbol.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphanumeric() {
            return u64::from(c.to_ascii_lowercase());
        }
    }
    // No logical key is known for this symbol.
    apply_plane(0, TIZEN_PLANE)
}

/// GTK key code reported in the legacy message, or 0 when unknown.
pub fn gtk_key_code_for_scan_code(scan_code: u32) -> u32 {
    scan_code_table()
        .get(&scan_code)
        .map(|entry| entry.gtk_key_code)
        .unwrap_or(0)
}

/// Translates an Ecore modifier mask into GTK modifier bits.
pub fn gtk_modifiers_for_ecore(modifiers: u32) -> i32 {
    ECORE_TO_GTK_MODIFIERS
        .iter()
        .filter(|(ecore, _)| ecore & modifiers != 0)
        .fold(0, |gtk, (_, bit)| gtk | bit)
}

/// Scan code to use for a software keyboard key that arrived without one.
///
/// Returns 0 for every symbol outside the small set the software keyboard is
/// known to emit this way.
pub fn fallback_scan_code(symbol: &str) -> u32 {
    FALLBACK_SCAN_CODES
        .iter()
        .find(|(name, _)| *name == symbol)
        .map(|&(_, scan_code)| scan_code)
        .unwrap_or(0)
}
