//! Core data types: property values, keyframes, clip and surface state.
//!
//! The serde representation matches the wire shape used by the state
//! publisher:
//!
//! ```json
//! {
//!   "intro": {
//!     "type": "video",
//!     "file": "intro.mp4",
//!     "fit": "cover",
//!     "audioOutput": "",
//!     "keyframes": [[0, { "set": { "t": 0, "rate": 1 } }], [5000, null]]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A keyframed property value.
///
/// Numbers interpolate; other values only ever hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Number(f64::from(v))
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

/// Partial property assignment, keyed by property name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// What a keyframe does to the clip's properties.
///
/// A keyframe may both `lerp` and `set` the same property: the value is
/// interpolated up to the keyframe, then replaced by the `set` value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeEffect {
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub set: PropertyMap,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub lerp: PropertyMap,
}

impl KeyframeEffect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: assign `key` at the keyframe's timestamp.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    /// Builder: interpolate `key` towards `value`, arriving at the keyframe's timestamp.
    pub fn lerp(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.lerp.insert(key.into(), value.into());
        self
    }

    /// Numeric value assigned by `set`, if any.
    pub fn set_number(&self, key: &str) -> Option<f64> {
        self.set.get(key).and_then(PropertyValue::as_f64)
    }
}

/// A timestamped instruction. `effect == None` marks the clip inactive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(i64, Option<KeyframeEffect>)", into = "(i64, Option<KeyframeEffect>)")]
pub struct Keyframe {
    /// Milliseconds on the shared (server) timeline.
    pub timestamp: i64,
    pub effect: Option<KeyframeEffect>,
}

impl Keyframe {
    pub fn new(timestamp: i64, effect: KeyframeEffect) -> Self {
        Self {
            timestamp,
            effect: Some(effect),
        }
    }

    /// A `null` keyframe: the clip is not active from `timestamp` on.
    pub fn inactive(timestamp: i64) -> Self {
        Self {
            timestamp,
            effect: None,
        }
    }

    pub fn is_inactive(&self) -> bool {
        self.effect.is_none()
    }

    pub(crate) fn at_or_before(&self, time: f64) -> bool {
        (self.timestamp as f64) <= time
    }
}

impl From<(i64, Option<KeyframeEffect>)> for Keyframe {
    fn from((timestamp, effect): (i64, Option<KeyframeEffect>)) -> Self {
        Self { timestamp, effect }
    }
}

impl From<Keyframe> for (i64, Option<KeyframeEffect>) {
    fn from(kf: Keyframe) -> Self {
        (kf.timestamp, kf.effect)
    }
}

/// How visual media is scaled into its surface.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    #[default]
    Contain,
    Cover,
    None,
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fit::Contain => write!(f, "contain"),
            Fit::Cover => write!(f, "cover"),
            Fit::None => write!(f, "none"),
        }
    }
}

/// Media kind of a clip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Image,
    Audio,
    Video,
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipKind::Image => write!(f, "image"),
            ClipKind::Audio => write!(f, "audio"),
            ClipKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageClip {
    pub file: String,
    #[serde(default)]
    pub fit: Fit,
    pub keyframes: Vec<Keyframe>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    pub file: String,
    /// Audio sink identifier; empty selects the default output.
    #[serde(default)]
    pub audio_output: String,
    pub keyframes: Vec<Keyframe>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoClip {
    pub file: String,
    #[serde(default)]
    pub audio_output: String,
    #[serde(default)]
    pub fit: Fit,
    pub keyframes: Vec<Keyframe>,
}

/// Declarative state of one clip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClipState {
    Image(ImageClip),
    Audio(AudioClip),
    Video(VideoClip),
}

impl ClipState {
    pub fn kind(&self) -> ClipKind {
        match self {
            ClipState::Image(_) => ClipKind::Image,
            ClipState::Audio(_) => ClipKind::Audio,
            ClipState::Video(_) => ClipKind::Video,
        }
    }

    /// Source reference (file or URL).
    pub fn file(&self) -> &str {
        match self {
            ClipState::Image(c) => &c.file,
            ClipState::Audio(c) => &c.file,
            ClipState::Video(c) => &c.file,
        }
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        match self {
            ClipState::Image(c) => &c.keyframes,
            ClipState::Audio(c) => &c.keyframes,
            ClipState::Video(c) => &c.keyframes,
        }
    }

    /// Fit mode, for kinds that render visually.
    pub fn fit(&self) -> Option<Fit> {
        match self {
            ClipState::Image(c) => Some(c.fit),
            ClipState::Audio(_) => None,
            ClipState::Video(c) => Some(c.fit),
        }
    }

    /// Audio sink, for kinds that produce sound.
    pub fn audio_output(&self) -> Option<&str> {
        match self {
            ClipState::Image(_) => None,
            ClipState::Audio(c) => Some(&c.audio_output),
            ClipState::Video(c) => Some(&c.audio_output),
        }
    }
}

/// Declarative state of a whole surface: clip id to clip state.
///
/// Backed by a `BTreeMap`, so iteration is always in sorted id order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceState(BTreeMap<String, ClipState>);

impl SurfaceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and validate a surface state from JSON.
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let state: SurfaceState = serde_json::from_str(json)?;
        state.validate()?;
        Ok(state)
    }

    /// Decode and validate a surface state from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, StateError> {
        let state: SurfaceState = serde_json::from_value(value)?;
        state.validate()?;
        Ok(state)
    }

    /// Reject clips that have no keyframes at all.
    pub fn validate(&self) -> Result<(), StateError> {
        for (clip_id, clip) in &self.0 {
            if clip.keyframes().is_empty() {
                return Err(StateError::NoKeyframes {
                    clip_id: clip_id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, clip_id: impl Into<String>, clip: ClipState) -> Option<ClipState> {
        self.0.insert(clip_id.into(), clip)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_clip(mut self, clip_id: impl Into<String>, clip: ClipState) -> Self {
        self.insert(clip_id, clip);
        self
    }

    pub fn get(&self, clip_id: &str) -> Option<&ClipState> {
        self.0.get(clip_id)
    }

    pub fn contains(&self, clip_id: &str) -> bool {
        self.0.contains_key(clip_id)
    }

    /// Clips in sorted id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClipState)> {
        self.0.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ClipState)> for SurfaceState {
    fn from_iter<I: IntoIterator<Item = (String, ClipState)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_STATE: &str = r#"{
        "b-video": {
            "type": "video",
            "file": "intro.mp4",
            "fit": "cover",
            "audioOutput": "",
            "keyframes": [[0, { "set": { "t": 0, "rate": 1, "volume": 0.5 } }], [5000, null]]
        },
        "a-image": {
            "type": "image",
            "file": "logo.png",
            "fit": "none",
            "keyframes": [[0, { "set": { "opacity": 0 } }], [1000, { "lerp": { "opacity": 1 } }]]
        }
    }"#;

    #[test]
    fn decodes_wire_shape() {
        let state = SurfaceState::from_json(VIDEO_STATE).unwrap();
        assert_eq!(state.len(), 2);

        let video = state.get("b-video").unwrap();
        assert_eq!(video.kind(), ClipKind::Video);
        assert_eq!(video.fit(), Some(Fit::Cover));
        assert_eq!(video.audio_output(), Some(""));
        assert_eq!(video.keyframes().len(), 2);
        assert!(video.keyframes()[1].is_inactive());
        assert_eq!(
            video.keyframes()[0].effect.as_ref().unwrap().set_number("volume"),
            Some(0.5)
        );

        let image = state.get("a-image").unwrap();
        assert_eq!(image.fit(), Some(Fit::None));
        assert_eq!(image.audio_output(), None);
    }

    #[test]
    fn iterates_in_sorted_order() {
        let state = SurfaceState::from_json(VIDEO_STATE).unwrap();
        let ids: Vec<&String> = state.ids().collect();
        assert_eq!(ids, vec!["a-image", "b-video"]);
    }

    #[test]
    fn rejects_clip_without_keyframes() {
        let json = r#"{ "x": { "type": "audio", "file": "a.mp3", "keyframes": [] } }"#;
        match SurfaceState::from_json(json) {
            Err(StateError::NoKeyframes { clip_id }) => assert_eq!(clip_id, "x"),
            other => panic!("expected NoKeyframes, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let json = r#"{ "x": { "type": "hologram", "file": "a", "keyframes": [[0, {}]] } }"#;
        assert!(matches!(SurfaceState::from_json(json), Err(StateError::Json(_))));
    }

    #[test]
    fn keyframe_serializes_as_tuple() {
        let kf = Keyframe::new(250, KeyframeEffect::new().lerp("opacity", 1.0));
        let json = serde_json::to_string(&kf).unwrap();
        assert_eq!(json, r#"[250,{"lerp":{"opacity":1.0}}]"#);
        assert_eq!(serde_json::to_string(&Keyframe::inactive(9)).unwrap(), "[9,null]");
    }

    #[test]
    fn text_and_bool_values_decode() {
        let kf: Keyframe = serde_json::from_str(r#"[0, { "set": { "label": "hi", "flag": true } }]"#).unwrap();
        let effect = kf.effect.unwrap();
        assert_eq!(effect.set["label"], PropertyValue::Text("hi".into()));
        assert_eq!(effect.set["flag"], PropertyValue::Bool(true));
    }
}
