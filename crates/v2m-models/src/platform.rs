//! Platform classification for submitted source links.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Short-video platform a source link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Douyin,
    Kuaishou,
    Bilibili,
    Xiaohongshu,
    Haokan,
    Weishi,
    Pearvideo,
    Pipigaoxiao,
}

/// Host substrings recognised per platform. First match wins.
const HOST_RULES: &[(&[&str], Platform)] = &[
    (&["douyin", "iesdouyin"], Platform::Douyin),
    (&["kuaishou", "kwai"], Platform::Kuaishou),
    (&["bilibili", "b23.tv"], Platform::Bilibili),
    (&["xiaohongshu", "xhslink"], Platform::Xiaohongshu),
    (&["haokan.baidu.com", "haokan.hao123.com"], Platform::Haokan),
    (&["weishi.qq.com", "isee.weishi"], Platform::Weishi),
    (&["pearvideo"], Platform::Pearvideo),
    (&["pipigx"], Platform::Pipigaoxiao),
];

impl Platform {
    /// Classify a URL by its host. Returns `None` for unsupported hosts or
    /// unparseable input.
    pub fn detect(raw_url: &str) -> Option<Self> {
        let parsed = Url::parse(raw_url.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();

        HOST_RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| host.contains(n)))
            .map(|(_, platform)| *platform)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Douyin => "douyin",
            Platform::Kuaishou => "kuaishou",
            Platform::Bilibili => "bilibili",
            Platform::Xiaohongshu => "xiaohongshu",
            Platform::Haokan => "haokan",
            Platform::Weishi => "weishi",
            Platform::Pearvideo => "pearvideo",
            Platform::Pipigaoxiao => "pipigaoxiao",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
