//! Test helpers for the `ipintel` workspace.
//!
//! Provides hex fixture decoding and the `test_binrw!` macro family used by
//! record definitions to assert byte-exact round trips. Intended for
//! `[dev-dependencies]` use only.

pub use pastey;

/// Decodes a hex string (no separators, even length) into bytes.
///
/// Panics on malformed input; fixtures are compile-time constants, so a bad
/// fixture should fail the test loudly.
pub fn decode_hex(hex: &str) -> Vec<u8> {
    assert!(
        hex.len() % 2 == 0,
        "hex fixture has odd length: {}",
        hex.len()
    );
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .unwrap_or_else(|_| panic!("bad hex fixture at byte {i}: {}", &hex[i..i + 2]))
        })
        .collect()
}

/// Encodes bytes as a lowercase hex string, for assertion failure output.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Converts a hex string literal into a `Vec<u8>` at runtime.
#[macro_export]
macro_rules! hex_to_u8_array {
    ($hex:expr) => {
        $crate::decode_hex($hex)
    };
}

/// Generates a read test: parses the hex fixture little-endian and asserts
/// equality with the given value.
///
/// ```ignore
/// test_binrw_read! {
///     ValueRecord => basic: ValueRecord { .. } => "0100a0000000..."
/// }
/// ```
#[macro_export]
macro_rules! test_binrw_read {
    (
        $struct_name:ident => $test_name:ident: $value:expr => $hex:expr
    ) => {
        $crate::pastey::paste! {
            #[test]
            fn [<test_ $struct_name:snake _ $test_name:snake _read>]() {
                use ::binrw::io::Cursor;
                use ::binrw::BinReaderExt;

                let bytes = $crate::hex_to_u8_array! { $hex };
                let mut cursor = Cursor::new(&bytes);
                let parsed: $struct_name = cursor.read_le().expect("fixture should parse");
                assert_eq!(parsed, $value);
                assert_eq!(
                    cursor.position() as usize,
                    bytes.len(),
                    "fixture not fully consumed"
                );
            }
        }
    };
}

/// Generates a write test: serialises the value little-endian and asserts the
/// output matches the hex fixture byte for byte.
#[macro_export]
macro_rules! test_binrw_write {
    (
        $struct_name:ident => $test_name:ident: $value:expr => $hex:expr
    ) => {
        $crate::pastey::paste! {
            #[test]
            fn [<test_ $struct_name:snake _ $test_name:snake _write>]() {
                use ::binrw::io::Cursor;
                use ::binrw::BinWriterExt;

                let value: $struct_name = $value;
                let mut cursor = Cursor::new(Vec::new());
                cursor.write_le(&value).expect("value should serialise");
                let written = cursor.into_inner();
                let expected = $crate::hex_to_u8_array! { $hex };
                assert_eq!(
                    $crate::encode_hex(&written),
                    $crate::encode_hex(&expected),
                );
            }
        }
    };
}

/// Generates both a read and a write test from one fixture.
#[macro_export]
macro_rules! test_binrw {
    ($($v:tt)+) => {
        $crate::test_binrw_read! { $($v)+ }
        $crate::test_binrw_write! { $($v)+ }
    };
}
