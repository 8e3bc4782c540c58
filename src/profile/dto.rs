use serde::{Deserialize, Serialize};

pub const GENDERS: [&str; 3] = ["male", "female", "other"];
pub const ACTIVITY_LEVELS: [&str; 5] = ["sedentary", "light", "moderate", "active", "very_active"];

/// Editable profile fields. Sent whole on create/replace; `to_patch` keeps
/// only the fields that are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>, // kg
    #[serde(default)]
    pub height: Option<f64>, // cm
    #[serde(default)]
    pub body_shape: Option<String>,
    #[serde(default)]
    pub health_conditions: Option<String>,
    #[serde(default)]
    pub fitness_goal: Option<String>,
    #[serde(default)]
    pub dietary_restrictions: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub activity_level: Option<String>,
}

impl ProfileFields {
    /// Same bounds the server enforces.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(age) = self.age {
            if age > 150 {
                return Err(format!("age must be between 0 and 150, got {age}"));
            }
        }
        if let Some(w) = self.weight {
            if !(0.0..=500.0).contains(&w) {
                return Err(format!("weight must be between 0 and 500 kg, got {w}"));
            }
        }
        if let Some(h) = self.height {
            if !(0.0..=300.0).contains(&h) {
                return Err(format!("height must be between 0 and 300 cm, got {h}"));
            }
        }
        if let Some(g) = self.gender.as_deref() {
            if !GENDERS.contains(&g) {
                return Err(format!("gender must be one of {}", GENDERS.join(", ")));
            }
        }
        if let Some(a) = self.activity_level.as_deref() {
            if !ACTIVITY_LEVELS.contains(&a) {
                return Err(format!(
                    "activity level must be one of {}",
                    ACTIVITY_LEVELS.join(", ")
                ));
            }
        }
        if self.full_name.as_deref().map_or(false, |n| n.chars().count() > 255) {
            return Err("full name is limited to 255 characters".into());
        }
        Ok(())
    }

    /// Overlays every field that is set in `other`.
    pub fn merge(&mut self, other: ProfileFields) {
        macro_rules! take {
            ($($f:ident),*) => { $( if other.$f.is_some() { self.$f = other.$f; } )* };
        }
        take!(
            full_name,
            age,
            gender,
            weight,
            height,
            body_shape,
            health_conditions,
            fitness_goal,
            dietary_restrictions,
            allergies,
            activity_level
        );
    }

    pub fn to_patch(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.retain(|_, v| !v.is_null());
        }
        value
    }

    pub fn is_empty(&self) -> bool {
        *self == ProfileFields::default()
    }
}

/// Profile as returned by `/profile/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(flatten)]
    pub fields: ProfileFields,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub bmi: Option<f64>,
}

impl UserProfile {
    /// Server value when present, otherwise derived from weight and height.
    pub fn bmi(&self) -> Option<f64> {
        self.bmi
            .or_else(|| compute_bmi(self.fields.weight, self.fields.height))
    }
}

pub fn compute_bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let (w, h) = (weight_kg?, height_cm?);
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let m = h / 100.0;
    Some((w / (m * m) * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bmi_rounds_to_two_decimals() {
        assert_eq!(compute_bmi(Some(70.0), Some(175.0)), Some(22.86));
        assert_eq!(compute_bmi(Some(70.0), None), None);
        assert_eq!(compute_bmi(Some(70.0), Some(0.0)), None);
    }

    #[test]
    fn profile_prefers_server_bmi() {
        let p: UserProfile = serde_json::from_str(
            r#"{"id":1,"email":"a@b.io","username":"a","is_active":true,
                "weight":70,"height":175,"bmi":22.0}"#,
        )
        .unwrap();
        assert_eq!(p.bmi(), Some(22.0));
        assert_eq!(p.fields.weight, Some(70.0));
    }

    #[test]
    fn patch_drops_unset_fields() {
        let fields = ProfileFields {
            age: Some(30),
            allergies: Some("peanuts".into()),
            ..Default::default()
        };
        assert_eq!(
            fields.to_patch(),
            serde_json::json!({"age": 30, "allergies": "peanuts"})
        );
        // full body keeps explicit nulls
        let full = serde_json::to_value(&fields).unwrap();
        assert!(full.get("gender").unwrap().is_null());
    }

    #[test]
    fn validation_mirrors_server_bounds() {
        let mut f = ProfileFields {
            age: Some(151),
            ..Default::default()
        };
        assert!(f.validate().is_err());
        f.age = Some(40);
        f.activity_level = Some("couch".into());
        assert!(f.validate().is_err());
        f.activity_level = Some("moderate".into());
        f.weight = Some(80.5);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn merge_only_overwrites_set_fields() {
        let mut base = ProfileFields {
            full_name: Some("Lan".into()),
            age: Some(20),
            ..Default::default()
        };
        base.merge(ProfileFields {
            age: Some(21),
            ..Default::default()
        });
        assert_eq!(base.full_name.as_deref(), Some("Lan"));
        assert_eq!(base.age, Some(21));
    }
}
