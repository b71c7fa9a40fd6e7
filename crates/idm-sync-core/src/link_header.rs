//! Parser for the HTTP `Link` response header (RFC 8288) as used for
//! pagination, e.g.
//!
//! ```text
//! <https://git.example/api/v4/users?page=2&per_page=20>; rel="next",
//! <https://git.example/api/v4/users?page=5&per_page=20>; rel="last"
//! ```

use reqwest::header::{HeaderMap, LINK};
use url::Url;

/// Relation types relevant for paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rel {
    Next,
    Prev,
    First,
    Last,
}

impl Rel {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "next" => Some(Rel::Next),
            "prev" | "previous" => Some(Rel::Prev),
            "first" => Some(Rel::First),
            "last" => Some(Rel::Last),
            _ => None,
        }
    }
}

/// One link of the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub uri: String,
    pub rel: Rel,
    /// `page` query parameter of the link, if present.
    pub page: Option<u32>,
    /// `per_page` query parameter of the link, if present.
    pub per_page: Option<u32>,
}

/// All recognized links of one `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHeader {
    links: Vec<Link>,
}

impl LinkHeader {
    /// Parse a header value; `None` if it contains no usable link.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let links: Vec<Link> = value.split(',').filter_map(parse_link).collect();
        if links.is_empty() {
            None
        } else {
            Some(Self { links })
        }
    }

    /// Parse the `Link` header of a response, if any.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    #[must_use]
    pub fn link(&self, rel: Rel) -> Option<&Link> {
        self.links.iter().find(|l| l.rel == rel)
    }

    #[must_use]
    pub fn has_link(&self, rel: Rel) -> bool {
        self.link(rel).is_some()
    }

    /// URI of the next page.
    #[must_use]
    pub fn next(&self) -> Option<&str> {
        self.link(Rel::Next).map(|l| l.uri.as_str())
    }
}

fn parse_link(part: &str) -> Option<Link> {
    let part = part.trim();
    let start = part.find('<')?;
    let end = part[start..].find('>')? + start;
    let uri = part[start + 1..end].trim().to_string();

    let rel = part[end + 1..].split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("rel") {
            Rel::parse(value.trim().trim_matches('"'))
        } else {
            None
        }
    })?;

    let (page, per_page) = Url::parse(&uri).map_or((None, None), |url| {
        let mut page = None;
        let mut per_page = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "page" => page = value.parse().ok(),
                "per_page" => per_page = value.parse().ok(),
                _ => {}
            }
        }
        (page, per_page)
    });

    Some(Link {
        uri,
        rel,
        page,
        per_page,
    })
}
