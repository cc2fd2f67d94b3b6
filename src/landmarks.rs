//! Landmark sources
//!
//! Detection itself happens outside this crate. A [`LandmarkDetector`] only
//! has to hand back normalized points for the first face it found.

use crate::{
    error::{Result, SmileDesignError},
    types::{LandmarkSet, NormalizedLandmark},
};
use image::DynamicImage;
use serde::Deserialize;
use std::path::Path;

/// Something that can locate one face's landmarks in an image
pub trait LandmarkDetector: Send + Sync {
    /// `Ok(None)` (or an empty set) means no face was found
    fn detect(&self, image: &DynamicImage) -> Result<Option<LandmarkSet>>;
}

/// Returns the same landmark set for every image
#[derive(Debug, Clone, Default)]
pub struct StaticLandmarks {
    landmarks: LandmarkSet,
}

impl StaticLandmarks {
    #[must_use]
    pub fn new(landmarks: LandmarkSet) -> Self {
        Self { landmarks }
    }
}

impl LandmarkDetector for StaticLandmarks {
    fn detect(&self, _image: &DynamicImage) -> Result<Option<LandmarkSet>> {
        if self.landmarks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.landmarks.clone()))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LandmarkDocument {
    Faces(Vec<Vec<NormalizedLandmark>>),
    Flat(Vec<NormalizedLandmark>),
    Wrapped { faces: Vec<Vec<NormalizedLandmark>> },
}

/// Landmarks exported by an external detector as JSON
///
/// Accepted shapes: a flat list of `{x, y}` points, a list of faces, or
/// `{"faces": [...]}`. Only the first face is used.
#[derive(Debug, Clone)]
pub struct JsonLandmarkFile {
    first_face: Option<LandmarkSet>,
    face_count: usize,
}

impl JsonLandmarkFile {
    /// Parse a landmark document
    ///
    /// # Errors
    /// - [`SmileDesignError::Serialization`] when the document matches no accepted shape
    /// - [`SmileDesignError::InvalidInput`] when a coordinate is not finite
    pub fn from_json(json: &str) -> Result<Self> {
        let document: LandmarkDocument = serde_json::from_str(json)?;
        let faces = match document {
            LandmarkDocument::Flat(points) if points.is_empty() => Vec::new(),
            LandmarkDocument::Flat(points) => vec![points],
            LandmarkDocument::Faces(faces) | LandmarkDocument::Wrapped { faces } => faces,
        };

        for (face, points) in faces.iter().enumerate() {
            if let Some(bad) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
                return Err(SmileDesignError::invalid_input(format!(
                    "Landmark {} of face {} has a non-finite coordinate",
                    bad, face
                )));
            }
        }

        let face_count = faces.len();
        if face_count > 1 {
            tracing::info!(faces = face_count, "Multiple faces in landmark file, using the first");
        }

        let first_face = faces
            .into_iter()
            .next()
            .filter(|points| !points.is_empty())
            .map(LandmarkSet::new);

        Ok(Self {
            first_face,
            face_count,
        })
    }

    /// Read and parse a landmark file
    ///
    /// # Errors
    /// - [`SmileDesignError::Io`] when the file cannot be read
    /// - Any error of [`Self::from_json`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SmileDesignError::file_io_error("read landmark file", path, &e))?;
        Self::from_json(&json)
    }

    /// Number of faces the document listed
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.face_count
    }

    #[must_use]
    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        self.first_face.as_ref()
    }
}

impl LandmarkDetector for JsonLandmarkFile {
    fn detect(&self, _image: &DynamicImage) -> Result<Option<LandmarkSet>> {
        Ok(self.first_face.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_list() {
        let file = JsonLandmarkFile::from_json(r#"[{"x":0.1,"y":0.2},{"x":0.3,"y":0.4}]"#).unwrap();
        assert_eq!(file.face_count(), 1);
        let landmarks = file.landmarks().unwrap();
        assert_eq!(landmarks.len(), 2);
        assert_eq!(landmarks.get(1), Some(NormalizedLandmark::new(0.3, 0.4)));
    }

    #[test]
    fn test_only_first_face_is_used() {
        let json = r#"[[{"x":0.1,"y":0.1}],[{"x":0.9,"y":0.9},{"x":0.8,"y":0.8}]]"#;
        let file = JsonLandmarkFile::from_json(json).unwrap();
        assert_eq!(file.face_count(), 2);

        let image = DynamicImage::new_rgb8(4, 4);
        let detected = file.detect(&image).unwrap().unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected.get(0), Some(NormalizedLandmark::new(0.1, 0.1)));
    }

    #[test]
    fn test_wrapped_and_empty_documents() {
        let file = JsonLandmarkFile::from_json(r#"{"faces":[[{"x":0.5,"y":0.5}]]}"#).unwrap();
        assert!(file.landmarks().is_some());

        let image = DynamicImage::new_rgb8(4, 4);
        for json in ["[]", r#"{"faces":[]}"#, "[[]]"] {
            let file = JsonLandmarkFile::from_json(json).unwrap();
            assert!(file.detect(&image).unwrap().is_none(), "{json}");
        }
    }

    #[test]
    fn test_malformed_document() {
        assert!(JsonLandmarkFile::from_json(r#"{"points": 3}"#).is_err());
        assert!(JsonLandmarkFile::from_json("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landmarks.json");
        std::fs::write(&path, r#"[{"x":0.25,"y":0.75}]"#).unwrap();
        let file = JsonLandmarkFile::load(&path).unwrap();
        assert_eq!(file.landmarks().map(LandmarkSet::len), Some(1));

        assert!(JsonLandmarkFile::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_static_landmarks() {
        let image = DynamicImage::new_rgb8(4, 4);
        assert!(StaticLandmarks::default().detect(&image).unwrap().is_none());

        let set = LandmarkSet::new(vec![NormalizedLandmark::new(0.5, 0.5)]);
        let detector = StaticLandmarks::new(set.clone());
        assert_eq!(detector.detect(&image).unwrap(), Some(set));
    }
}
