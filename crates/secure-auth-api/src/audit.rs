//! Security audit logging for authentication events
//!
//! Every event is emitted at INFO level (faults at WARN) on the `audit`
//! target so it can be filtered and routed apart from application logs.
//! Passwords, hashes and tokens never appear in an event.
//!
//! # Example
//!
//! ```ignore
//! use secure_auth_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::Logout {
//!     user_id,
//!     session_id,
//!     ip_address: Some("192.168.1.1".to_string()),
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use axum::http::{header, HeaderMap};
use secure_auth_core::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: UserId,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    LoginSuccess {
        user_id: UserId,
        session_id: SessionId,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login. `reason` is server-side only; clients see one
    /// indistinguishable response.
    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    Logout {
        user_id: UserId,
        session_id: SessionId,
        ip_address: Option<String>,
    },

    /// Request to a protected route refused as unauthenticated
    AuthenticationRejected {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Request to a protected route failed on a server-side fault
    AuthenticationFault {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
}

/// Client metadata captured at the network boundary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Resolve client metadata from proxy headers, falling back to the
    /// socket peer address
    pub fn from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self {
            ip_address: extract_ip_address(headers).or_else(|| peer.map(|p| p.ip().to_string())),
            user_agent: extract_user_agent(headers),
        }
    }

    pub fn ip_or_empty(&self) -> &str {
        self.ip_address.as_deref().unwrap_or_default()
    }

    pub fn user_agent_or_empty(&self) -> &str {
        self.user_agent.as_deref().unwrap_or_default()
    }
}

/// Log a security audit event with structured fields
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::RegistrationSuccess {
            user_id,
            email,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                event = %event_json,
                user_id = %user_id,
                email = %email,
                ip_address = ?ip_address,
                "Registration successful"
            );
        }
        AuditEvent::RegistrationFailure {
            email,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                event = %event_json,
                email = %email,
                reason = %reason,
                ip_address = ?ip_address,
                "Registration failed"
            );
        }
        AuditEvent::LoginSuccess {
            user_id,
            session_id,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                event = %event_json,
                user_id = %user_id,
                session_id = %session_id,
                ip_address = ?ip_address,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            email,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                event = %event_json,
                email = %email,
                reason = %reason,
                ip_address = ?ip_address,
                "Login failed"
            );
        }
        AuditEvent::Logout {
            user_id,
            session_id,
            ip_address,
        } => {
            info!(
                target: "audit",
                event = %event_json,
                user_id = %user_id,
                session_id = %session_id,
                ip_address = ?ip_address,
                "User logout"
            );
        }
        AuditEvent::AuthenticationRejected {
            reason, ip_address, ..
        } => {
            info!(
                target: "audit",
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "Authentication rejected"
            );
        }
        AuditEvent::AuthenticationFault {
            reason, ip_address, ..
        } => {
            warn!(
                target: "audit",
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "Authentication fault"
            );
        }
    }
}

/// Extract the client IP address from proxy headers
///
/// Checks X-Forwarded-For (first hop) and then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.trim().to_string());
        }
    }

    None
}

/// Extract the user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
