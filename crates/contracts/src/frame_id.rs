//! FrameId - Cheap-to-clone coordinate frame name
//!
//! Uses Arc<str> internally for O(1) clone operations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Root of the global chain (absolute survey frame).
pub const UTM_FRAME: &str = "utm";
/// Grid-anchored local copy of the survey frame.
pub const LOCAL_UTM_FRAME: &str = "local_utm";
/// Locally continuous world frame.
pub const SMOOTH_FRAME: &str = "smooth";
/// Vehicle body frame, parent of every mounted sensor.
pub const VEHICLE_FRAME: &str = "vehicle";

/// Coordinate frame identifier with cheap cloning.
///
/// Frame names are created once (config, robot model) and cloned on every
/// transform tree edge and every spin, so cloning only bumps a refcount.
///
/// # Examples
/// ```
/// use contracts::FrameId;
///
/// let id: FrameId = "velodyne".into();
/// let id2 = id.clone();
/// assert_eq!(id, id2);
/// assert_eq!(id.as_str(), "velodyne");
/// ```
#[derive(Clone, Default)]
pub struct FrameId(Arc<str>);

impl FrameId {
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn utm() -> Self {
        Self::new(UTM_FRAME)
    }

    pub fn local_utm() -> Self {
        Self::new(LOCAL_UTM_FRAME)
    }

    pub fn smooth() -> Self {
        Self::new(SMOOTH_FRAME)
    }

    pub fn vehicle() -> Self {
        Self::new(VEHICLE_FRAME)
    }
}

impl Deref for FrameId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for FrameId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FrameId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FrameId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for FrameId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for FrameId {
    #[inline]
    fn from(s: &String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({:?})", self.0)
    }
}

impl PartialEq for FrameId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for FrameId {}

impl PartialEq<str> for FrameId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for FrameId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialEq<String> for FrameId {
    #[inline]
    fn eq(&self, other: &String) -> bool {
        self.0.as_ref() == other
    }
}

// Must match str's hash so HashMap<FrameId, _> can be queried with &str.
impl Hash for FrameId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for FrameId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FrameId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
