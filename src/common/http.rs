use reqwest::{Client, Error};
use std::time::Duration;

/// Builds `reqwest::Client`s carrying the standard fetch headers (§6) every
/// playlist and segment request must send.
pub struct HttpClient;

impl HttpClient {
    pub const USER_AGENT: &'static str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    pub const REFERER: &'static str = "https://www.dailymotion.com/";
    pub const ORIGIN: &'static str = "https://www.dailymotion.com";

    pub fn new() -> Result<Client, Error> {
        use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(REFERER, HeaderValue::from_static(Self::REFERER));
        headers.insert(ORIGIN, HeaderValue::from_static(Self::ORIGIN));

        Client::builder()
            .user_agent(Self::USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
    }
}
