//! Built-in tools offered to the model in `toolchat chat`.

use chrono::{Local, Utc};
use runtime::{BoundArguments, ToolDefinition, ToolError, handler_fn};

/// Every built-in tool, ready for `ToolRegistry::register_all`.
pub fn builtin() -> Vec<ToolDefinition> {
    vec![current_time(), convert_temperature()]
}

fn current_time() -> ToolDefinition {
    ToolDefinition::new(
        "GetCurrentTime",
        "Returns the current local date and time together with UTC and the local offset",
    )
    .handler(handler_fn(|_args: BoundArguments| async {
        Ok::<_, ToolError>(describe_now())
    }))
}

fn describe_now() -> String {
    let local = Local::now();
    format!(
        "local={} utc={} timezone={}",
        local.format("%Y-%m-%d %H:%M:%S"),
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        local.format("%:z"),
    )
}

fn convert_temperature() -> ToolDefinition {
    ToolDefinition::new(
        "ConvertTemperature",
        "Converts a temperature between Celsius and Fahrenheit",
    )
    .parameter("Value", "The temperature to convert, e.g. 21.5")
    .parameter(
        "Unit",
        "The unit of Value: C for Celsius or F for Fahrenheit",
    )
    .handler(handler_fn(|args: BoundArguments| async move {
        convert(args.get("Value"), args.get("Unit"))
    }))
}

fn convert(value: &str, unit: &str) -> Result<String, ToolError> {
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| ToolError::InvalidInput(format!("'{value}' is not a number")))?;

    match unit.trim().to_ascii_uppercase().as_str() {
        "C" | "CELSIUS" => Ok(format!("{:.1}°F", value * 9.0 / 5.0 + 32.0)),
        "F" | "FAHRENHEIT" => Ok(format!("{:.1}°C", (value - 32.0) * 5.0 / 9.0)),
        other => Err(ToolError::InvalidInput(format!(
            "unknown unit '{other}', expected C or F"
        ))),
    }
}
