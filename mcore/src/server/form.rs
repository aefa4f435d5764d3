/// `"Multipart/Form-Data; boundary=x"` -> `"multipart/form-data"`
pub(super) fn mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub(super) fn urlencoded_value(src: &[u8], key: &str) -> Option<String> {
    url::form_urlencoded::parse(src)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// boundary parameter of a multipart content type, unquoted
pub(super) fn boundary(content_type: &str) -> Option<String> {
    param(content_type.split(';').skip(1), "boundary").filter(|b| !b.is_empty())
}

/// Value of the first non-file part named `key`. Malformed bodies yield None.
pub(super) fn multipart_value(body: &[u8], boundary: &str, key: &str) -> Option<String> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut pos = find(body, delimiter)? + delimiter.len();
    loop {
        let rest = &body[pos..];
        // closing delimiter
        if rest.starts_with(b"--") {
            return None;
        }
        let part_start = pos + find(rest, b"\r\n")? + 2;

        let part_len = find_delimiter(&body[part_start..], delimiter)?;
        let part = &body[part_start..part_start + part_len];
        if let Some(value) = part_value(part, key) {
            return Some(value);
        }

        // skip "\r\n--boundary"
        pos = part_start + part_len + 2 + delimiter.len();
    }
}

fn find_delimiter(src: &[u8], delimiter: &[u8]) -> Option<usize> {
    let mut from = 0;
    loop {
        let i = from + find(&src[from..], b"\r\n")?;
        if src[i + 2..].starts_with(delimiter) {
            return Some(i);
        }
        from = i + 2;
    }
}

fn part_value(part: &[u8], key: &str) -> Option<String> {
    let (head, content) = if part.starts_with(b"\r\n") {
        (&part[..0], &part[2..])
    } else {
        let end = find(part, b"\r\n\r\n")?;
        (&part[..end], &part[end + 4..])
    };

    let head = std::str::from_utf8(head).ok()?;
    let disposition = head.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-disposition")
            .then_some(value)
    })?;

    let mut params = disposition.split(';');
    if !params.next()?.trim().eq_ignore_ascii_case("form-data") {
        return None;
    }
    let params: Vec<&str> = params.collect();

    // file uploads are not form values
    if param(params.iter().copied(), "filename").is_some() {
        return None;
    }
    if param(params.iter().copied(), "name")? != key {
        return None;
    }
    Some(String::from_utf8_lossy(content).into_owned())
}

fn param<'a>(params: impl Iterator<Item = &'a str>, name: &str) -> Option<String> {
    params.into_iter().find_map(|p| {
        let (k, v) = p.split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(name) {
            return None;
        }
        let v = v.trim();
        let v = v
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(v);
        Some(v.to_owned())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
