use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier for a stored point.
///
/// String ids are native to the embedded and simple backends; the production
/// backend accepts integers and UUID strings only, and the façade coerces
/// anything else before delegating there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Integer(u64),
    String(String),
}

impl PointId {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PointId::String(s) => Some(s),
            PointId::Integer(_) => None,
        }
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointId::String(s) => write!(f, "{}", s),
            PointId::Integer(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for PointId {
    fn from(value: &str) -> Self {
        PointId::String(value.to_string())
    }
}

impl From<String> for PointId {
    fn from(value: String) -> Self {
        PointId::String(value)
    }
}

impl From<u64> for PointId {
    fn from(value: u64) -> Self {
        PointId::Integer(value)
    }
}

/// One stored unit: identifier, fixed-length vector, metadata payload.
///
/// The vector length must equal the collection's configured dimension.
/// Re-upserting the same id replaces the stored point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl VectorPoint {
    pub fn new(id: impl Into<PointId>, vector: Vec<f32>, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

/// Similarity function used to compare two vectors.
///
/// Parsing accepts the backend-neutral vocabulary (`cosine`, `l2`, `euclid`,
/// `ip`, `dot`, case-insensitive), which also covers every backend's native
/// spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclid,
    Dot,
}

impl DistanceMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cosine" => Some(DistanceMetric::Cosine),
            "l2" | "euclid" => Some(DistanceMetric::Euclid),
            "ip" | "dot" => Some(DistanceMetric::Dot),
            _ => None,
        }
    }

    /// Native spelling for the embedded file-based backend.
    pub fn lance_name(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclid => "l2",
            DistanceMetric::Dot => "dot",
        }
    }

    /// Native spelling for the simple client-server backend.
    pub fn chroma_name(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclid => "l2",
            DistanceMetric::Dot => "ip",
        }
    }

    /// Native spelling for the production client-server backend.
    pub fn qdrant_name(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "Cosine",
            DistanceMetric::Euclid => "Euclid",
            DistanceMetric::Dot => "Dot",
        }
    }
}

/// A conjunction of field-level predicates, translated per backend inside
/// each adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    pub must: Vec<FilterCondition>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Build a filter from a flat key → candidate-values mapping.
    ///
    /// A single candidate becomes an equality match; several candidates
    /// become a set-membership match. Keys with no candidates are dropped.
    pub fn from_criteria<I>(criteria: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<Value>)>,
    {
        let must = criteria
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(key, mut values)| {
                let clause = if values.len() == 1 {
                    MatchClause::Text(values.remove(0))
                } else {
                    MatchClause::Any(values)
                };
                FilterCondition { key, clause }
            })
            .collect();
        Self { must }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub key: String,
    #[serde(rename = "match")]
    pub clause: MatchClause,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchClause {
    /// Field value is one of the listed scalars.
    Any(Vec<Value>),
    /// Field value equals the scalar.
    Text(Value),
}

/// One scored hit. Higher score means more similar; scores are comparable
/// across collections queried with the same embedding.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub score: f32,
    pub payload: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn point_id_display() {
        assert_eq!(PointId::from("chunk-1").to_string(), "chunk-1");
        assert_eq!(PointId::from(42u64).to_string(), "42");
    }

    #[test]
    fn point_id_serde_untagged() {
        let ids: Vec<PointId> = serde_json::from_value(json!(["chunk-1", 42])).unwrap();
        assert_eq!(ids[0], PointId::String("chunk-1".into()));
        assert_eq!(ids[1], PointId::Integer(42));
    }

    #[test]
    fn metric_parse_neutral_vocabulary() {
        assert_eq!(DistanceMetric::parse("cosine"), Some(DistanceMetric::Cosine));
        assert_eq!(DistanceMetric::parse("l2"), Some(DistanceMetric::Euclid));
        assert_eq!(DistanceMetric::parse("euclid"), Some(DistanceMetric::Euclid));
        assert_eq!(DistanceMetric::parse("ip"), Some(DistanceMetric::Dot));
        assert_eq!(DistanceMetric::parse("dot"), Some(DistanceMetric::Dot));
    }

    #[test]
    fn metric_parse_case_insensitive_and_native() {
        assert_eq!(DistanceMetric::parse("Cosine"), Some(DistanceMetric::Cosine));
        assert_eq!(DistanceMetric::parse("Euclid"), Some(DistanceMetric::Euclid));
        assert_eq!(DistanceMetric::parse("Dot"), Some(DistanceMetric::Dot));
        assert_eq!(DistanceMetric::parse("COSINE"), Some(DistanceMetric::Cosine));
    }

    #[test]
    fn metric_parse_rejects_unknown() {
        assert_eq!(DistanceMetric::parse("manhattan"), None);
        assert_eq!(DistanceMetric::parse(""), None);
    }

    #[test]
    fn filter_from_criteria_single_value_is_equality() {
        let filter = SearchFilter::from_criteria(vec![(
            "language".to_string(),
            vec![json!("rust")],
        )]);
        assert_eq!(filter.must.len(), 1);
        assert!(matches!(filter.must[0].clause, MatchClause::Text(_)));
    }

    #[test]
    fn filter_from_criteria_many_values_is_membership() {
        let filter = SearchFilter::from_criteria(vec![(
            "language".to_string(),
            vec![json!("rust"), json!("go")],
        )]);
        assert!(matches!(&filter.must[0].clause, MatchClause::Any(v) if v.len() == 2));
    }

    #[test]
    fn filter_from_criteria_drops_empty_keys() {
        let filter = SearchFilter::from_criteria(vec![("language".to_string(), vec![])]);
        assert!(filter.is_empty());
    }
}
