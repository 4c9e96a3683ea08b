//! Scripts injected into the shared page.

/// Masks the usual automation fingerprints before any vendor script runs.
/// Installed once per session via `Page.addScriptToEvaluateOnNewDocument`.
pub(crate) const STEALTH_JS: &str = r#"
(() => {
    Object.defineProperty(navigator, 'webdriver', {
        get: () => false,
    });

    Object.defineProperty(navigator, 'languages', {
        get: () => ['he-IL', 'he', 'en-US', 'en'],
    });

    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5],
    });

    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };

    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
            Promise.resolve({ state: Notification.permission }) :
            originalQuery(parameters)
    );
})();
"#;

/// Replaces the page console with a capturing shim. Captured lines are
/// drained by `DRAIN_CONSOLE_JS` after the vendor script has run.
pub(crate) const CAPTURE_CONSOLE_JS: &str = r#"
(() => {
    window.__basketConsole = {
        logs: [],
        original: {
            log: console.log,
            info: console.info,
            warn: console.warn,
            error: console.error,
        },
    };

    ["log", "info", "warn", "error"].forEach(method => {
        console[method] = (...args) => {
            window.__basketConsole?.logs.push(`[${method}] ${JSON.stringify(args)}`);
            window.__basketConsole?.original[method](...args);
        };
    });
})();
"#;

/// Restores the original console and returns whatever was captured.
pub(crate) const DRAIN_CONSOLE_JS: &str = r#"
(() => {
    const helper = window.__basketConsole;
    if (!helper) return [];
    Object.assign(console, helper.original);
    delete window.__basketConsole;
    return helper.logs;
})();
"#;

/// Apply a caller-supplied function script to its JSON-encoded arguments.
/// The script is expected to be a (possibly async) arrow function of one
/// argument, matching the in-page entry points the vendor modules carry.
pub(crate) fn apply_script(script: &str, args: &serde_json::Value) -> String {
    format!("({script})({args})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_script_embeds_arguments_as_json() {
        let wrapped = apply_script("async (args) => args.qty", &json!({"qty": 3}));
        assert_eq!(wrapped, "(async (args) => args.qty)({\"qty\":3})");
    }

    #[test]
    fn console_shim_and_drain_reference_the_same_slot() {
        assert!(CAPTURE_CONSOLE_JS.contains("__basketConsole"));
        assert!(DRAIN_CONSOLE_JS.contains("__basketConsole"));
    }
}
