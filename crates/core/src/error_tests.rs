// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn display_includes_kind_and_message() {
    let err = ApiError::not_found("job missing");
    assert_eq!(err.to_string(), "not_found: job missing");
}

#[test]
fn constructors_set_expected_kind() {
    assert_eq!(ApiError::forbidden("x").kind, Kind::Forbidden);
    assert_eq!(ApiError::conflict("x").kind, Kind::Conflict);
    assert_eq!(ApiError::invalid("x").kind, Kind::Invalid);
    assert_eq!(ApiError::limit_exceeded("x").kind, Kind::LimitExceeded);
    assert_eq!(ApiError::internal("x").kind, Kind::Internal);
}

#[test]
fn kind_display_is_snake_case() {
    assert_eq!(Kind::NotFound.to_string(), "not_found");
    assert_eq!(Kind::LimitExceeded.to_string(), "limit_exceeded");
}
