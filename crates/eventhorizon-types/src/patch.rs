use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A field in a partial update.
///
/// `Keep` is omitted from the body and leaves the server value alone, `Clear`
/// is sent as JSON `null`, `Set` replaces the value. Use with
/// `#[serde(default, skip_serializing_if = "Patch::is_keep")]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Applies the patch to a locally held optional value.
    pub fn apply_to(self, target: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *target = None,
            Patch::Set(value) => *target = Some(value),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Set(value) => value.serialize(serializer),
            Patch::Keep | Patch::Clear => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Body {
        #[serde(default, skip_serializing_if = "Patch::is_keep")]
        name: Patch<String>,
        #[serde(default, skip_serializing_if = "Patch::is_keep")]
        note: Patch<String>,
    }

    #[test]
    fn keep_is_absent_clear_is_null_set_is_value() {
        let body = Body {
            name: Patch::Set("a".to_string()),
            note: Patch::Clear,
        };
        assert_eq!(
            serde_json::to_value(&body).expect("encode"),
            json!({"name": "a", "note": null})
        );
        assert_eq!(
            serde_json::to_value(Body::default()).expect("encode"),
            json!({})
        );
    }

    #[test]
    fn decoding_distinguishes_missing_from_null() {
        let body: Body = serde_json::from_value(json!({"note": null})).expect("decode");
        assert_eq!(body.name, Patch::Keep);
        assert_eq!(body.note, Patch::Clear);
    }

    #[test]
    fn apply_to_follows_field_semantics() {
        let mut value = Some(1);
        Patch::Keep.apply_to(&mut value);
        assert_eq!(value, Some(1));
        Patch::Set(2).apply_to(&mut value);
        assert_eq!(value, Some(2));
        Patch::Clear.apply_to(&mut value);
        assert_eq!(value, None);
    }
}
