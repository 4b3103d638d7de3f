/// Resolves a possibly-relative URI against a base playlist URL (§4.B).
/// Absolute URLs pass through unchanged; a leading `/` resolves against the
/// base's host; a leading `./` is stripped then concatenated; anything else
/// is concatenated onto the base's directory.
pub fn resolve(base: &str, maybe_relative: &str) -> String {
    if maybe_relative.starts_with("http://") || maybe_relative.starts_with("https://") {
        return maybe_relative.to_string();
    }

    let base_clean = base.split('?').next().unwrap_or(base);
    let base_clean = base_clean.split('#').next().unwrap_or(base_clean);

    if let Some(rel) = maybe_relative.strip_prefix("./") {
        let base_dir = base_clean
            .rfind('/')
            .map(|i| &base_clean[..=i])
            .unwrap_or(base_clean);
        return format!("{base_dir}{rel}");
    }

    if maybe_relative.starts_with('/') {
        if let Some(scheme_end) = base_clean.find("://") {
            let host_start = scheme_end + 3;
            let host_end = base_clean[host_start..]
                .find('/')
                .map(|p| host_start + p)
                .unwrap_or(base_clean.len());
            return format!("{}{}", &base_clean[..host_end], maybe_relative);
        }
    }

    let base_dir = base_clean
        .rfind('/')
        .map(|i| &base_clean[..=i])
        .unwrap_or(base_clean);
    format!("{base_dir}{maybe_relative}")
}

/// Collapses one level of double percent-encoding (observed producer bug:
/// `%2520` emitted for `%20`), leaving already-single-encoded values alone.
/// Bounded to a single pass — it does not loop to a fixed point.
pub fn canonicalize(url: &str) -> String {
    if let Ok(decoded_once) = urlencoding::decode(url) {
        if decoded_once.contains('%') {
            if let Ok(decoded_twice) = urlencoding::decode(&decoded_once) {
                if decoded_twice != decoded_once && looks_like_double_encoded(url) {
                    return decoded_once.into_owned();
                }
            }
        }
    }
    url.to_string()
}

fn looks_like_double_encoded(url: &str) -> bool {
    url.contains("%25")
}

/// True if the URL is a byte-range/chunked URL, which the resolver rejects
/// before it ever enters the segment pipeline (§4.B).
pub fn is_byte_range_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if let Some(query_start) = lower.find('?') {
        let query = &lower[query_start + 1..];
        if query
            .split('&')
            .any(|pair| pair.starts_with("range="))
        {
            return true;
        }
    }
    lower
        .split('/')
        .any(|segment| segment == "range")
}
