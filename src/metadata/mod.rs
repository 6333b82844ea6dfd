// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Identity of the invocation being profiled.

/// The function and request that a session belongs to, as reported by the
/// hosting runtime (for AWS Lambda, `Context::invoked_function_arn` and
/// `Context::request_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationIdentity {
    /// ARN the function was invoked with.
    pub function_arn: String,
    /// Id of the request that triggered the invocation.
    pub request_id: String,
}

impl InvocationIdentity {
    /// Makes a new one.
    pub fn new(function_arn: impl Into<String>, request_id: impl Into<String>) -> Self {
        InvocationIdentity {
            function_arn: function_arn.into(),
            request_id: request_id.into(),
        }
    }

    /// Destination key prefix for this invocation's artifacts.
    pub(crate) fn key_prefix(&self) -> String {
        format!("{}/{}/", self.function_arn, self.request_id)
    }
}

/// Key prefix for artifacts produced outside of any known invocation.
pub const UNKNOWN_INVOCATION_PREFIX: &str = "unknown/";
