use super::decoder::Measure;

/// Joins decoded values with commas, the way they are persisted: `[1, 0]` -> `"1,0"`.
pub fn result_to_string(result: &[Measure]) -> String {
    result
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
