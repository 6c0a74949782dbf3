// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status_reasons` module

#[cfg(test)]
mod tests {
    use crate::status_reasons::*;

    #[test]
    fn test_condition_status_values() {
        assert_eq!(STATUS_TRUE, "True");
        assert_eq!(STATUS_FALSE, "False");
        assert_eq!(STATUS_UNKNOWN, "Unknown");
    }

    #[test]
    fn test_version_condition_types() {
        assert_eq!(CONDITION_TYPE_ONE_AGENT_VERSION, "OneAgentVersion");
        assert_eq!(CONDITION_TYPE_CODE_MODULES_VERSION, "CodeModulesVersion");
        assert_eq!(CONDITION_TYPE_ACTIVE_GATE_VERSION, "ActiveGateVersion");
        assert_eq!(CONDITION_TYPE_OTEL_COLLECTOR_VERSION, "OtelCollectorVersion");
    }

    #[test]
    fn test_version_reasons() {
        assert_eq!(REASON_VERIFIED, "Verified");
        assert_eq!(REASON_DOWNGRADE, "Downgrade");
        assert_eq!(REASON_VERIFICATION_FAILED, "VerificationFailed");
        assert_eq!(REASON_DYNATRACE_API_ERROR, "DynatraceAPIError");
    }

    #[test]
    fn test_collector_reasons() {
        assert_eq!(CONDITION_TYPE_COLLECTOR_CONFIG, "TelemetryIngestConfiguration");
        assert_eq!(REASON_STATEFULSET_CREATED, "StatefulSetCreated");
        assert_eq!(REASON_KUBE_API_ERROR, "KubeApiError");
    }

    #[test]
    fn test_injection_reasons_are_distinct() {
        let reasons = [
            REASON_EMPTY_TENANT_UUID,
            REASON_EMPTY_CONNECTION_INFO,
            REASON_UNKNOWN_CODE_MODULE,
        ];
        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
