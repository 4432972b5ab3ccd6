//! Scale datagram payload parsing.
//!
//! The scale broadcasts a short comma-separated text frame several times per
//! weighing. The second field carries the reading, optionally followed by a
//! single frame terminator.

/// Read the weight field from a raw datagram.
///
/// Returns the reading in the scale's own unit, or a human-readable reason
/// the payload was rejected.
pub fn parse_weight(payload: &[u8]) -> Result<f64, String> {
    let text = String::from_utf8_lossy(payload);
    let field = text
        .split(',')
        .nth(1)
        .ok_or_else(|| "missing weight field".to_string())?;

    let field = match field.chars().last() {
        Some(last) if !last.is_ascii_digit() => &field[..field.len() - last.len_utf8()],
        _ => field,
    };
    let field = field.trim();

    let value: f64 = field
        .parse()
        .map_err(|_| format!("weight field '{field}' is not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("weight {value} is out of range"));
    }
    Ok(value)
}
