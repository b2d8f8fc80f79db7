//! Deployment slot naming
//!
//! An application has an active slot named after the app and a staging slot
//! `{app}-green`. `{app}-old` holds the displaced unit between the name swap
//! and cleanup of one blue/green release.

/// Unit names of an application's slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNames {
    pub active: String,
    pub staging: String,
    pub old: String,
}

impl SlotNames {
    pub fn for_app(app_name: &str) -> Self {
        Self {
            active: app_name.to_string(),
            staging: format!("{}-green", app_name),
            old: format!("{}-old", app_name),
        }
    }
}
