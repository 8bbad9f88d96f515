//! Tool names and arguments for the MusicBrainz/Discogs tools the bridge exposes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Artist,
    #[default]
    Release,
    Recording,
    Label,
    Discogs,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Artist => "artist",
            SearchType::Release => "release",
            SearchType::Recording => "recording",
            SearchType::Label => "label",
            SearchType::Discogs => "discogs",
        }
    }

    pub fn search_tool_name(&self) -> &'static str {
        match self {
            SearchType::Discogs => "discogs-search",
            SearchType::Recording => "musicbrainz-search-recording",
            SearchType::Artist => "musicbrainz-search-artist",
            SearchType::Label => "musicbrainz-search-label",
            SearchType::Release => "musicbrainz-search-release",
        }
    }

    pub fn lookup_tool_name(&self) -> &'static str {
        match self {
            SearchType::Discogs => "discogs-lookup",
            SearchType::Recording => "musicbrainz-lookup-recording",
            SearchType::Artist => "musicbrainz-lookup-artist",
            SearchType::Label => "musicbrainz-lookup-label",
            SearchType::Release => "musicbrainz-lookup-release",
        }
    }

    /// Search type a tool name belongs to; anything unrecognized is a release tool.
    pub fn from_tool_name(tool_name: &str) -> Self {
        [
            SearchType::Discogs,
            SearchType::Recording,
            SearchType::Artist,
            SearchType::Label,
        ]
        .into_iter()
        .find(|search_type| tool_name.contains(search_type.as_str()))
        .unwrap_or(SearchType::Release)
    }

    /// Key holding the result list: `results` for Discogs, `<type>s` for MusicBrainz.
    pub fn results_key(&self) -> String {
        match self {
            SearchType::Discogs => "results".to_string(),
            other => format!("{}s", other.as_str()),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(SearchType::Artist),
            "release" => Ok(SearchType::Release),
            "recording" => Ok(SearchType::Recording),
            "label" => Ok(SearchType::Label),
            "discogs" => Ok(SearchType::Discogs),
            other => Err(format!("unknown search type: {other}")),
        }
    }
}

/// Search form input. Numeric fields are raw text; blank or unparsable values fall
/// back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub artist: String,
    pub title: String,
    pub limit: Option<String>,
    pub offset: Option<String>,
    /// Discogs result type (`release`, `master`, `artist`, `label`).
    pub discogs_type: Option<String>,
    pub per_page: Option<String>,
    pub page: Option<String>,
}

impl SearchQuery {
    pub fn new(artist: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Tool arguments for `search_type`.
    pub fn to_arguments(&self, search_type: SearchType) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert("artist".to_string(), json!(self.artist));
        arguments.insert("title".to_string(), json!(self.title));
        arguments.insert("limit".to_string(), json!(parse_count(self.limit.as_deref(), 10)));

        if search_type == SearchType::Discogs {
            let discogs_type = self
                .discogs_type
                .as_deref()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or("release");
            arguments.insert("type".to_string(), json!(discogs_type));
            arguments.insert(
                "per_page".to_string(),
                json!(parse_count(self.per_page.as_deref(), 10)),
            );
            arguments.insert("page".to_string(), json!(parse_count(self.page.as_deref(), 1)));
        } else {
            arguments.insert(
                "offset".to_string(),
                json!(parse_count(self.offset.as_deref(), 0)),
            );
        }
        arguments
    }
}

fn parse_count(raw: Option<&str>, default: i64) -> i64 {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(default)
}

/// Lookup arguments: `discogs_id` for Discogs, `mbid` otherwise.
pub fn lookup_arguments(search_type: SearchType, id: &str) -> Map<String, Value> {
    let key = match search_type {
        SearchType::Discogs => "discogs_id",
        _ => "mbid",
    };
    let mut arguments = Map::new();
    arguments.insert(key.to_string(), json!(id));
    arguments
}

/// Result list of a search response; empty when the expected key is missing.
pub fn extract_search_results(response: &Value, search_type: SearchType) -> Vec<Value> {
    response
        .get(search_type.results_key())
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_by_type() {
        let cases = [
            (SearchType::Artist, "musicbrainz-search-artist", "musicbrainz-lookup-artist"),
            (SearchType::Release, "musicbrainz-search-release", "musicbrainz-lookup-release"),
            (
                SearchType::Recording,
                "musicbrainz-search-recording",
                "musicbrainz-lookup-recording",
            ),
            (SearchType::Label, "musicbrainz-search-label", "musicbrainz-lookup-label"),
            (SearchType::Discogs, "discogs-search", "discogs-lookup"),
        ];
        for (search_type, search, lookup) in cases {
            assert_eq!(search_type.search_tool_name(), search);
            assert_eq!(search_type.lookup_tool_name(), lookup);
            assert_eq!(SearchType::from_tool_name(search), search_type);
            assert_eq!(search_type.as_str().parse::<SearchType>(), Ok(search_type));
        }
        assert_eq!(SearchType::from_tool_name("something-else"), SearchType::Release);
    }

    #[test]
    fn musicbrainz_search_arguments() {
        let arguments = SearchQuery::new("Boards of Canada")
            .with_limit("25")
            .to_arguments(SearchType::Artist);

        assert_eq!(
            Value::Object(arguments),
            json!({"artist": "Boards of Canada", "title": "", "limit": 25, "offset": 0})
        );
    }

    #[test]
    fn discogs_search_arguments_use_paging() {
        let query = SearchQuery {
            per_page: Some("5".to_string()),
            limit: Some("many".to_string()),
            ..SearchQuery::new("Autechre").with_title("Amber")
        };

        assert_eq!(
            Value::Object(query.to_arguments(SearchType::Discogs)),
            json!({
                "artist": "Autechre",
                "title": "Amber",
                "limit": 10,
                "type": "release",
                "per_page": 5,
                "page": 1
            })
        );
    }

    #[test]
    fn lookup_arguments_by_type() {
        assert_eq!(
            Value::Object(lookup_arguments(SearchType::Discogs, "123")),
            json!({"discogs_id": "123"})
        );
        assert_eq!(
            Value::Object(lookup_arguments(SearchType::Recording, "mbid-1")),
            json!({"mbid": "mbid-1"})
        );
    }

    #[test]
    fn search_results_extraction() {
        let musicbrainz = json!({"artists": [{"id": "abc"}], "count": 1});
        let discogs = json!({"results": [{"id": 1}, {"id": 2}]});

        assert_eq!(extract_search_results(&musicbrainz, SearchType::Artist).len(), 1);
        assert_eq!(extract_search_results(&discogs, SearchType::Discogs).len(), 2);
        assert!(extract_search_results(&musicbrainz, SearchType::Label).is_empty());
        assert!(extract_search_results(&Value::Null, SearchType::Artist).is_empty());
    }
}
