use alloy_primitives::U256;

const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Human-readable detail from `Error(string)` or `Panic(uint256)` revert data.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (selector, body) = data.split_first_chunk::<4>()?;
    match *selector {
        ERROR_SELECTOR => decode_error_string(body),
        PANIC_SELECTOR => decode_panic(body),
        _ => None,
    }
}

fn word(body: &[u8], offset: usize) -> Option<U256> {
    let end = offset.checked_add(32)?;
    body.get(offset..end).map(U256::from_be_slice)
}

fn decode_error_string(body: &[u8]) -> Option<String> {
    let offset = usize::try_from(word(body, 0)?).ok()?;
    let len = usize::try_from(word(body, offset)?).ok()?;
    let start = offset.checked_add(32)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

fn decode_panic(body: &[u8]) -> Option<String> {
    let code = word(body, 0)?;
    let description = match u64::try_from(code).unwrap_or(u64::MAX) {
        0x00 => "generic panic",
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum conversion",
        0x22 => "invalid storage byte array encoding",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to zero-initialized function",
        _ => "unknown panic",
    };
    Some(format!("Panic({code:#x}): {description}"))
}
