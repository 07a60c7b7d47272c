//! Scheme documents served from memory.

/// `First` → `Second` → end.
pub const LINEAR: (&str, &str) = (
    "mem://linear",
    r#"{
        "name": "linear",
        "root": {
            "id": "Main", "kind": "process", "start": "First",
            "children": [
                { "id": "First", "kind": "step", "next": "Second" },
                { "id": "Second", "kind": "step" }
            ]
        }
    }"#,
);

/// A composite `Outer` whose sub-graph ends, followed by `Final`.
pub const NESTED: (&str, &str) = (
    "mem://nested",
    r#"{
        "name": "nested",
        "root": {
            "id": "Main", "kind": "process", "start": "Outer",
            "children": [
                {
                    "id": "Outer", "kind": "process", "start": "Inner1", "next": "Final",
                    "children": [
                        { "id": "Inner1", "kind": "step", "next": "Inner2" },
                        { "id": "Inner2", "kind": "step" }
                    ]
                },
                { "id": "Final", "kind": "step" }
            ]
        }
    }"#,
);

/// `Decide` returns a key nothing maps.
pub const UNMAPPED: (&str, &str) = (
    "mem://unmapped",
    r#"{
        "name": "unmapped",
        "root": {
            "id": "Main", "kind": "process", "start": "Decide",
            "children": [
                { "id": "Decide", "kind": "step",
                  "parameters": { "Key": "Unmapped" },
                  "transitions": { "Go": "Done" } },
                { "id": "Done", "kind": "step" }
            ]
        }
    }"#,
);

/// Parameters referencing the root and the executing activity.
pub const BINDINGS: (&str, &str) = (
    "mem://bindings",
    r#"{
        "name": "bindings",
        "root": {
            "id": "Main", "kind": "process", "start": "Check",
            "children": [
                { "id": "Check", "kind": "step",
                  "parameters": {
                      "Note": "@Root.Owner",
                      "Priority": "high",
                      "Key": "@@Checked"
                  },
                  "transitions": { "@Checked": "Limit" } },
                { "id": "Limit", "kind": "step",
                  "parameters": { "Note": "@R.Limit" } }
            ]
        }
    }"#,
);

/// `Check` references a property no activity exposes.
pub const BROKEN_BINDING: (&str, &str) = (
    "mem://broken-binding",
    r#"{
        "name": "broken-binding",
        "root": {
            "id": "Main", "kind": "process", "start": "Check",
            "children": [
                { "id": "Check", "kind": "step", "parameters": { "Note": "@Missing" } }
            ]
        }
    }"#,
);

/// `Charge` fails its action.
pub const FAILING: (&str, &str) = (
    "mem://failing",
    r#"{
        "name": "failing",
        "root": {
            "id": "Main", "kind": "process", "start": "Charge",
            "children": [
                { "id": "Charge", "kind": "failer", "next": "Receipt" },
                { "id": "Receipt", "kind": "step" }
            ]
        }
    }"#,
);

/// A single leaf.
pub const QUICK: (&str, &str) = (
    "mem://quick",
    r#"{
        "name": "quick",
        "root": {
            "id": "Main", "kind": "process", "start": "Quick",
            "children": [ { "id": "Quick", "kind": "step" } ]
        }
    }"#,
);

/// `Nap` sleeps for `delay`, then navigates with `Rested` to `After`.
pub fn sleepy(delay: &str) -> String {
    format!(
        r#"{{
            "name": "sleepy",
            "root": {{
                "id": "Main", "kind": "process", "start": "Nap",
                "children": [
                    {{ "id": "Nap", "kind": "sleeper",
                       "parameters": {{ "Delay": "{delay}", "Key": "Rested" }},
                       "transitions": {{ "Rested": "After" }} }},
                    {{ "id": "After", "kind": "step" }}
                ]
            }}
        }}"#
    )
}

/// `Gate` waits for `approved` and `paid`, expiring after `timeout`.
pub fn gated(timeout: &str) -> String {
    format!(
        r#"{{
            "name": "gated",
            "root": {{
                "id": "Main", "kind": "process", "start": "Gate",
                "children": [
                    {{ "id": "Gate", "kind": "waiter",
                       "parameters": {{
                           "Signals": "[approved, paid]",
                           "Timeout": "{timeout}",
                           "Key": "Open"
                       }},
                       "transitions": {{ "Open": "Inspect", "Expired": "Late" }} }},
                    {{ "id": "Inspect", "kind": "step", "parameters": {{ "Signal": "approved" }} }},
                    {{ "id": "Late", "kind": "step" }}
                ]
            }}
        }}"#
    )
}

/// `Nap` sleeps for `delay`, then `Gate` waits for `approved` and `Inspect`
/// records its payload.
pub fn nap_then_gate(delay: &str) -> String {
    format!(
        r#"{{
            "name": "nap-then-gate",
            "root": {{
                "id": "Main", "kind": "process", "start": "Nap",
                "children": [
                    {{ "id": "Nap", "kind": "sleeper",
                       "parameters": {{ "Delay": "{delay}", "Key": "Rested" }},
                       "transitions": {{ "Rested": "Gate" }} }},
                    {{ "id": "Gate", "kind": "waiter",
                       "parameters": {{ "Signals": "[approved]", "Key": "Open" }},
                       "transitions": {{ "Open": "Inspect" }} }},
                    {{ "id": "Inspect", "kind": "step", "parameters": {{ "Signal": "approved" }} }}
                ]
            }}
        }}"#
    )
}

/// Uses an activity kind nobody registered.
pub const UNKNOWN_KIND: (&str, &str) = (
    "mem://unknown-kind",
    r#"{
        "name": "unknown-kind",
        "root": {
            "id": "Main", "kind": "process", "start": "Mystery",
            "children": [ { "id": "Mystery", "kind": "mystery" } ]
        }
    }"#,
);

/// Not valid JSON.
pub const MALFORMED: (&str, &str) = (
    "mem://malformed",
    "{\n  \"name\": \"malformed\",\n  \"root\": {\n    \"id\": }\n}",
);
