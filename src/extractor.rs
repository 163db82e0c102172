//! Finds the channel's current live video in browse responses.
//!
//! Two layouts are understood. The tab-scoped layout puts the newest video
//! at a fixed position under the selected tab; when that position does not
//! exist the whole response is scanned for video nodes instead. In both cases
//! a video only counts when one of its thumbnail overlays is styled `LIVE`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json::{self, Segment};
use crate::path;

pub const LIVE_STYLE: &str = "LIVE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStream {
    pub id: String,
    pub title: String,
    pub url: String,
}

impl LiveStream {
    /// Reads a stream out of a video node. Returns `None` when the node has
    /// no `videoId`; a missing title or url becomes an empty string.
    pub fn from_node(node: &Value) -> Option<Self> {
        let id = json::get_str(Some(node), &path!["videoId"])?;
        let title = json::get_str(Some(node), &path!["title", "runs", 0, "text"])
            .or_else(|| json::get_str(Some(node), &path!["title", "simpleText"]));
        let url = json::get_str(
            Some(node),
            &path!["navigationEndpoint", "commandMetadata", "webCommandMetadata", "url"],
        );

        if title.is_none() || url.is_none() {
            debug!("Live video {} is missing its title or url", id);
        }

        Some(Self {
            id: id.to_string(),
            title: title.unwrap_or_default().to_string(),
            url: url.unwrap_or_default().to_string(),
        })
    }
}

/// Live streams found in one poll, de-duplicated by id, in scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub candidates: Vec<LiveStream>,
}

impl Extraction {
    /// The stream the poller should act on: the first in scan order.
    pub fn live_stream(&self) -> Option<&LiveStream> {
        self.candidates.first()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }

    pub fn into_live_stream(self) -> Option<LiveStream> {
        self.candidates.into_iter().next()
    }
}

const TABS: [Segment<'static>; 3] = [
    Segment::Key("contents"),
    Segment::Key("twoColumnBrowseResultsRenderer"),
    Segment::Key("tabs"),
];

const TAB_VIDEO: [Segment<'static>; 12] = [
    Segment::Key("tabRenderer"),
    Segment::Key("content"),
    Segment::Key("sectionListRenderer"),
    Segment::Key("contents"),
    Segment::Index(0),
    Segment::Key("itemSectionRenderer"),
    Segment::Key("contents"),
    Segment::Index(0),
    Segment::Key("gridRenderer"),
    Segment::Key("items"),
    Segment::Index(0),
    Segment::Key("gridVideoRenderer"),
];

/// Returns the video node at the top of the selected tab. `Err` carries the
/// first path that did not resolve.
pub fn tab_scoped(response: &Value) -> Result<&Value, String> {
    let tabs = json::resolve(response, &TABS)?;
    let selected = tabs
        .as_array()
        .and_then(|tabs| {
            tabs.iter().find(|tab| {
                json::get(Some(*tab), &path!["tabRenderer", "selected"])
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            })
        })
        .ok_or_else(|| format!("{}[selected]", json::format_path(&TABS)))?;

    json::resolve(selected, &TAB_VIDEO)
        .map_err(|missing| format!("{}[selected].{}", json::format_path(&TABS), missing))
}

/// Collects every node that has both a `videoId` and `thumbnailOverlays`,
/// depth first, in document order. A matching node is collected before the
/// nodes nested inside it.
pub fn scan<'v>(value: &'v Value, out: &mut Vec<&'v Value>) {
    match value {
        Value::Object(map) => {
            if map.contains_key("videoId") && map.contains_key("thumbnailOverlays") {
                out.push(value);
            }
            map.values().for_each(|v| scan(v, out));
        }
        Value::Array(list) => list.iter().for_each(|v| scan(v, out)),
        _ => (),
    }
}

pub fn is_live(node: &Value) -> bool {
    json::get(Some(node), &path!["thumbnailOverlays"])
        .and_then(Value::as_array)
        .map(|overlays| {
            overlays.iter().any(|overlay| {
                json::get_str(
                    Some(overlay),
                    &path!["thumbnailOverlayTimeStatusRenderer", "style"],
                ) == Some(LIVE_STYLE)
            })
        })
        .unwrap_or(false)
}

/// Video nodes of one response: the tab-scoped node if that layout is
/// present, every scanned node otherwise.
fn video_nodes(response: &Value) -> Vec<&Value> {
    match tab_scoped(response) {
        Ok(node) => vec![node],
        Err(missing) => {
            debug!("Tab layout not found at {}, scanning response", missing);
            let mut nodes = Vec::new();
            scan(response, &mut nodes);
            nodes
        }
    }
}

/// Reduces the responses of one poll to the live streams they show.
pub fn extract(responses: &[Value]) -> Extraction {
    let mut candidates: Vec<LiveStream> = Vec::new();

    for node in responses.iter().flat_map(video_nodes) {
        if !is_live(node) {
            continue;
        }
        match LiveStream::from_node(node) {
            Some(stream) if candidates.iter().any(|c| c.id == stream.id) => {
                trace!("Skipping duplicate live video {}", stream.id);
            }
            Some(stream) => candidates.push(stream),
            None => warn!("Skipping live video node without a videoId"),
        }
    }

    Extraction { candidates }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn get_test_json(fname: &str) -> Value {
        let mut d = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("resources/test/");
        d.push(fname);
        let text =
            std::fs::read_to_string(d).expect(format!("Could not read {}", fname).as_str());
        serde_json::from_str(&text).expect("fixture is valid JSON")
    }

    fn live_node(id: &str, title: &str) -> Value {
        json!({
            "videoId": id,
            "title": {"runs": [{"text": title}]},
            "navigationEndpoint": {
                "commandMetadata": {"webCommandMetadata": {"url": format!("/watch?v={}", id)}}
            },
            "thumbnailOverlays": [
                {"thumbnailOverlayTimeStatusRenderer": {"style": "LIVE"}}
            ]
        })
    }

    #[test]
    fn grid_layout_live() {
        let response = get_test_json("browse_grid_live.json");
        let extraction = extract(&[response]);

        assert!(!extraction.is_ambiguous());
        assert_eq!(
            extraction.live_stream(),
            Some(&LiveStream {
                id: "abc".into(),
                title: "Hello".into(),
                url: "/watch?v=abc".into(),
            })
        );
    }

    #[test]
    fn grid_layout_offline() {
        let response = get_test_json("browse_offline.json");
        assert!(tab_scoped(&response).is_ok());
        assert_eq!(extract(&[response]).live_stream(), None);
    }

    #[test]
    fn rich_grid_falls_back_to_scan() {
        let response = get_test_json("browse_rich_grid.json");

        let missing = tab_scoped(&response).unwrap_err();
        assert_eq!(
            missing,
            "contents.twoColumnBrowseResultsRenderer.tabs[selected].tabRenderer.content.sectionListRenderer"
        );

        let extraction = extract(&[response]);
        assert_eq!(extraction.candidates.len(), 1);
        let stream = extraction.live_stream().unwrap();
        assert_eq!(stream.id, "xyz");
        assert_eq!(stream.title, "Late night");
        assert_eq!(stream.url, "/watch?v=xyz");
    }

    #[test]
    fn no_selected_tab() {
        let response = json!({
            "contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
                {"tabRenderer": {"selected": false}}
            ]}}
        });
        assert_eq!(
            tab_scoped(&response).unwrap_err(),
            "contents.twoColumnBrowseResultsRenderer.tabs[selected]"
        );
    }

    #[test]
    fn unrecognised_shapes_are_not_live() {
        assert_eq!(extract(&[]), Extraction::default());
        assert_eq!(extract(&[json!(null), json!("text"), json!([1, 2])]), Extraction::default());
        assert_eq!(extract(&[json!({"error": {"code": 400}})]), Extraction::default());
    }

    #[test]
    fn ambiguous_across_responses_picks_first() {
        let first = json!({"items": [live_node("abc", "Morning")]});
        let second = json!({"items": [live_node("xyz", "Evening")]});

        let extraction = extract(&[first, second]);
        assert!(extraction.is_ambiguous());
        assert_eq!(extraction.live_stream().unwrap().id, "abc");
        assert_eq!(extraction.into_live_stream().unwrap().title, "Morning");
    }

    #[test]
    fn live_video_nested_in_matching_node() {
        let response = json!({"items": [{
            "videoId": "playlist-head",
            "thumbnailOverlays": [
                {"thumbnailOverlayTimeStatusRenderer": {"style": "DEFAULT"}}
            ],
            "videos": [live_node("abc", "Hello")]
        }]});

        let mut nodes = Vec::new();
        scan(&response, &mut nodes);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["videoId"], json!("playlist-head"));

        let extraction = extract(&[response]);
        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(extraction.live_stream().unwrap().id, "abc");
    }

    #[test]
    fn same_video_in_two_responses_is_not_ambiguous() {
        let extraction = extract(&[
            json!({"items": [live_node("abc", "Morning")]}),
            json!({"shelf": {"items": [live_node("abc", "Morning")]}}),
        ]);
        assert!(!extraction.is_ambiguous());
        assert_eq!(extraction.candidates.len(), 1);
    }

    #[test]
    fn missing_fields() {
        let node = json!({
            "videoId": "abc",
            "thumbnailOverlays": [{"thumbnailOverlayTimeStatusRenderer": {"style": "LIVE"}}]
        });
        assert_eq!(
            LiveStream::from_node(&node),
            Some(LiveStream {
                id: "abc".into(),
                title: String::new(),
                url: String::new(),
            })
        );

        let no_id = json!({
            "videoId": null,
            "thumbnailOverlays": [{"thumbnailOverlayTimeStatusRenderer": {"style": "LIVE"}}]
        });
        assert!(is_live(&no_id));
        assert_eq!(LiveStream::from_node(&no_id), None);
        assert_eq!(extract(&[json!({"items": [no_id]})]).live_stream(), None);
    }

    #[test]
    fn simple_text_title() {
        let node = json!({"videoId": "abc", "title": {"simpleText": "Plain"}});
        assert_eq!(LiveStream::from_node(&node).unwrap().title, "Plain");
    }

    #[test]
    fn live_marker() {
        assert!(is_live(&live_node("abc", "x")));
        assert!(!is_live(&json!({"thumbnailOverlays": "LIVE"})));
        assert!(!is_live(&json!({"thumbnailOverlays": [
            {"thumbnailOverlayTimeStatusRenderer": {"style": "UPCOMING"}}
        ]})));
    }
}
