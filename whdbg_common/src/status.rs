//! HTTP status codes offered by the override editor

/// Status code selected when a session starts
pub const DEFAULT_STATUS_CODE: u16 = 200;

/// Known status codes and their display labels, in ascending order
pub const STATUS_CODES: &[(u16, &str)] = &[
    (100, "100 Continue"),
    (101, "101 Switching Protocols"),
    (102, "102 Processing"),
    (103, "103 Early Hints"),
    (200, "200 OK"),
    (201, "201 Created"),
    (202, "202 Accepted"),
    (203, "203 Non-Authoritative Information"),
    (204, "204 No Content"),
    (205, "205 Reset Content"),
    (206, "206 Partial Content"),
    (207, "207 Multi-Status"),
    (208, "208 Already Reported"),
    (226, "226 IM Used"),
    (300, "300 Multiple Choices"),
    (301, "301 Moved Permanently"),
    (302, "302 Found"),
    (303, "303 See Other"),
    (304, "304 Not Modified"),
    (305, "305 Use Proxy"),
    (307, "307 Temporary Redirect"),
    (308, "308 Permanent Redirect"),
    (400, "400 Bad Request"),
    (401, "401 Unauthorized"),
    (402, "402 Payment Required"),
    (403, "403 Forbidden"),
    (404, "404 Not Found"),
    (405, "405 Method Not Allowed"),
    (406, "406 Not Acceptable"),
    (407, "407 Proxy Authentication Required"),
    (408, "408 Request Timeout"),
    (409, "409 Conflict"),
    (410, "410 Gone"),
    (411, "411 Length Required"),
    (412, "412 Precondition Failed"),
    (413, "413 Request Entity Too Large"),
    (414, "414 Request URI Too Long"),
    (415, "415 Unsupported Media Type"),
    (416, "416 Requested Range Not Satisfiable"),
    (417, "417 Expectation Failed"),
    (418, "418 I'm a teapot"),
    (421, "421 Misdirected Request"),
    (422, "422 Unprocessable Entity"),
    (423, "423 Locked"),
    (424, "424 Failed Dependency"),
    (425, "425 Too Early"),
    (426, "426 Upgrade Required"),
    (428, "428 Precondition Required"),
    (429, "429 Too Many Requests"),
    (431, "431 Request Header Fields Too Large"),
    (451, "451 Unavailable For Legal Reasons"),
    (500, "500 Internal Server Error"),
    (501, "501 Not Implemented"),
    (502, "502 Bad Gateway"),
    (503, "503 Service Unavailable"),
    (504, "504 Gateway Timeout"),
    (505, "505 HTTP Version Not Supported"),
    (506, "506 Variant Also Negotiates"),
    (507, "507 Insufficient Storage"),
    (508, "508 Loop Detected"),
    (510, "510 Not Extended"),
    (511, "511 Network Authentication Required"),
];

/// Position of a code in the catalog
pub fn position(code: u16) -> Option<usize> {
    STATUS_CODES.binary_search_by_key(&code, |(c, _)| *c).ok()
}

/// Display label for a code, if the catalog knows it
pub fn label(code: u16) -> Option<&'static str> {
    position(code).map(|i| STATUS_CODES[i].1)
}

pub fn is_known(code: u16) -> bool {
    position(code).is_some()
}

/// The catalog code after `code`, staying on the last entry
pub fn next(code: u16) -> u16 {
    match position(code) {
        Some(i) => STATUS_CODES[(i + 1).min(STATUS_CODES.len() - 1)].0,
        None => DEFAULT_STATUS_CODE,
    }
}

/// The catalog code before `code`, staying on the first entry
pub fn previous(code: u16) -> u16 {
    match position(code) {
        Some(i) => STATUS_CODES[i.saturating_sub(1)].0,
        None => DEFAULT_STATUS_CODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_sorted_and_bounded() {
        assert!(STATUS_CODES.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(STATUS_CODES.first().map(|(c, _)| *c), Some(100));
        assert_eq!(STATUS_CODES.last().map(|(c, _)| *c), Some(511));
        assert!(STATUS_CODES
            .iter()
            .all(|(code, label)| label.starts_with(&code.to_string())));
    }

    #[test]
    fn test_default_is_ok() {
        assert_eq!(label(DEFAULT_STATUS_CODE), Some("200 OK"));
        assert_eq!(position(DEFAULT_STATUS_CODE), Some(4));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(label(404), Some("404 Not Found"));
        assert_eq!(label(418), Some("418 I'm a teapot"));
        assert!(is_known(226));
        assert!(!is_known(306));
        assert!(!is_known(999));
        assert_eq!(label(509), None);
    }

    #[test]
    fn test_next_and_previous() {
        assert_eq!(next(200), 201);
        assert_eq!(next(305), 307);
        assert_eq!(next(511), 511);
        assert_eq!(previous(100), 100);
        assert_eq!(previous(400), 308);
        assert_eq!(next(999), DEFAULT_STATUS_CODE);
    }
}
