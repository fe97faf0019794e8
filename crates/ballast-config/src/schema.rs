use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::BallastConfig;

/// JSON schema for `ballast.toml`, for editor tooling and CI validation.
#[must_use]
pub fn json_schema() -> RootSchema {
    schema_for!(BallastConfig)
}
