/// Lua-backed expression evaluator
///
/// Every evaluation gets a fresh, sandboxed Lua 5.4 state: dangerous globals
/// are scrubbed, a few date/time helpers are installed, the caller's bindings
/// become globals, and the source runs as an expression (Lua falls back to a
/// chunk when it does not parse as one). The blocking VM work runs on a
/// spawn_blocking worker bounded by a wall-clock budget.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ExpressionEvaluator, ScriptError};

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        ScriptError::Eval(err.to_string())
    }
}

/// Evaluator embedding Lua 5.4 through mlua (vendored, no system Lua needed)
#[derive(Debug, Clone)]
pub struct LuaEvaluator {
    /// Wall-clock budget for a single evaluation
    budget: Duration,
}

impl LuaEvaluator {
    pub fn new(budget_ms: u64) -> Self {
        Self {
            budget: Duration::from_millis(budget_ms),
        }
    }

    /// Run one evaluation on a blocking worker under the wall-clock budget
    async fn run(
        &self,
        source: &str,
        bindings: Vec<(String, Value)>,
    ) -> Result<Evaluated, ScriptError> {
        let source = source.to_string();
        let worker = tokio::task::spawn_blocking(move || evaluate_blocking(&source, &bindings));

        match tokio::time::timeout(self.budget, worker).await {
            Err(_) => Err(ScriptError::BudgetExceeded(self.budget.as_millis() as u64)),
            Ok(Err(join)) => Err(ScriptError::Worker(join.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl ExpressionEvaluator for LuaEvaluator {
    async fn evaluate(
        &self,
        source: &str,
        bindings: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        Ok(self.run(source, bindings).await?.value)
    }

    async fn evaluate_bool(
        &self,
        source: &str,
        bindings: Vec<(String, Value)>,
    ) -> Result<bool, ScriptError> {
        Ok(self.run(source, bindings).await?.truthy)
    }
}

/// One evaluation's outcome: the JSON conversion of the final value plus its
/// Lua truthiness, taken from the raw value before conversion (in Lua only
/// nil and false are falsy; 0 and "" are truthy)
struct Evaluated {
    value: Value,
    truthy: bool,
}

fn evaluate_blocking(source: &str, bindings: &[(String, Value)]) -> Result<Evaluated, ScriptError> {
    let lua = mlua::Lua::new();
    install_environment(&lua, bindings)?;

    let result: mlua::Value = lua.load(source).eval()?;
    let truthy = !matches!(result, mlua::Value::Nil | mlua::Value::Boolean(false));

    Ok(Evaluated {
        value: lua_to_json(result)?,
        truthy,
    })
}

/// Prepare the sandbox: helper globals in, dangerous globals out, then the
/// caller's bindings installed as globals
fn install_environment(lua: &mlua::Lua, bindings: &[(String, Value)]) -> Result<(), ScriptError> {
    let globals = lua.globals();

    // date("%Y-%m-%d") - formatted current UTC time
    globals.set(
        "date",
        lua.create_function(|_, format: String| {
            let mut rendered = String::new();
            match write!(rendered, "{}", chrono::Utc::now().format(&format)) {
                Ok(()) => Ok(rendered),
                Err(_) => Err(mlua::Error::RuntimeError(format!(
                    "invalid date format: {}",
                    format
                ))),
            }
        })?,
    )?;

    // time() - current unix timestamp in seconds
    globals.set(
        "time",
        lua.create_function(|_, ()| Ok(chrono::Utc::now().timestamp()))?,
    )?;

    // now() - current UTC time as an RFC 3339 string
    globals.set(
        "now",
        lua.create_function(|_, ()| Ok(chrono::Utc::now().to_rfc3339()))?,
    )?;

    // Remove globals that reach outside the VM
    globals.set("os", mlua::Nil)?;
    globals.set("io", mlua::Nil)?;
    globals.set("debug", mlua::Nil)?;
    globals.set("package", mlua::Nil)?;

    if !bindings.is_empty() {
        let mut setup = String::new();
        for (name, value) in bindings {
            setup.push_str(&format!("{} = {}\n", name, json_to_lua_literal(value)?));
        }
        lua.load(setup.as_str()).exec()?;
    }

    Ok(())
}

/// Deepest value nesting either conversion direction will follow. A cyclic
/// table trips this cap instead of recursing until the stack runs out.
const MAX_VALUE_DEPTH: usize = 128;

/// Render a JSON value as a Lua literal for the binding setup chunk
///
/// Objects use bracket notation for keys so names that are not valid Lua
/// identifiers (or that collide with keywords) still work. Nesting past
/// `MAX_VALUE_DEPTH` is an error.
fn json_to_lua_literal(value: &Value) -> Result<String, ScriptError> {
    json_to_lua_literal_at(value, 0)
}

fn json_to_lua_literal_at(value: &Value, depth: usize) -> Result<String, ScriptError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(ScriptError::Eval(
            "binding nesting exceeds maximum depth".to_string(),
        ));
    }

    match value {
        Value::Null => Ok("nil".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(format!("\"{}\"", escape_lua_string(s))),
        Value::Array(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| json_to_lua_literal_at(item, depth + 1))
                .collect::<Result<_, _>>()?;
            Ok(format!("{{{}}}", rendered.join(", ")))
        }
        Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(key, val)| -> Result<String, ScriptError> {
                    Ok(format!(
                        "[\"{}\"] = {}",
                        escape_lua_string(key),
                        json_to_lua_literal_at(val, depth + 1)?
                    ))
                })
                .collect::<Result<_, _>>()?;
            Ok(format!("{{{}}}", rendered.join(", ")))
        }
    }
}

// Backslash first so the other escapes are not doubled
fn escape_lua_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Convert a Lua value back to JSON
///
/// Tables keyed exactly by 1..=n become arrays, everything else becomes an
/// object. Values JSON cannot represent (functions, userdata, NaN) become
/// null. Nesting past `MAX_VALUE_DEPTH` is an error, so a self-referencing
/// table (`t.self = t`) fails the evaluation rather than the process.
fn lua_to_json(lua_value: mlua::Value) -> Result<Value, ScriptError> {
    lua_to_json_at(lua_value, 0)
}

fn lua_to_json_at(lua_value: mlua::Value, depth: usize) -> Result<Value, ScriptError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(ScriptError::Eval(
            "table nesting exceeds maximum depth".to_string(),
        ));
    }

    match lua_value {
        mlua::Value::Nil => Ok(Value::Null),
        mlua::Value::Boolean(b) => Ok(Value::Bool(b)),
        mlua::Value::Integer(i) => Ok(Value::Number(serde_json::Number::from(i))),
        mlua::Value::Number(f) => Ok(serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        mlua::Value::String(s) => Ok(Value::String(s.to_str()?.to_string())),
        mlua::Value::Table(table) => {
            let mut entries: Vec<(mlua::Value, mlua::Value)> = Vec::new();
            for pair in table.pairs::<mlua::Value, mlua::Value>() {
                entries.push(pair?);
            }

            // Array iff the keys are exactly the integers 1..=n
            let mut is_array = !entries.is_empty();
            let mut max_index = 0usize;
            for (key, _) in &entries {
                match key {
                    mlua::Value::Integer(i) if *i > 0 => {
                        max_index = max_index.max(*i as usize);
                    }
                    _ => {
                        is_array = false;
                        break;
                    }
                }
            }

            if is_array && entries.len() == max_index {
                let mut items = vec![Value::Null; max_index];
                for (key, value) in entries {
                    if let mlua::Value::Integer(i) = key {
                        items[i as usize - 1] = lua_to_json_at(value, depth + 1)?;
                    }
                }
                Ok(Value::Array(items))
            } else {
                let mut object = Map::new();
                for (key, value) in entries {
                    let key = match key {
                        mlua::Value::String(s) => s.to_str()?.to_string(),
                        mlua::Value::Integer(i) => i.to_string(),
                        mlua::Value::Number(f) => f.to_string(),
                        _ => continue,
                    };
                    object.insert(key, lua_to_json_at(value, depth + 1)?);
                }
                Ok(Value::Object(object))
            }
        }
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluator() -> LuaEvaluator {
        LuaEvaluator::new(5_000)
    }

    #[tokio::test]
    async fn evaluates_arithmetic_expression() {
        let result = evaluator().evaluate("1 + 1", vec![]).await.unwrap();
        assert_eq!(result, json!(2));
    }

    #[tokio::test]
    async fn table_result_becomes_json_object() {
        let result = evaluator()
            .evaluate("return { score = 42, tags = {\"a\", \"b\"} }", vec![])
            .await
            .unwrap();
        assert_eq!(result, json!({ "score": 42, "tags": ["a", "b"] }));
    }

    #[tokio::test]
    async fn bindings_are_visible_as_globals() {
        let bindings = vec![("json".to_string(), json!({ "score": 21 }))];
        let result = evaluator().evaluate("json.score * 2", bindings).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn string_bindings_survive_escaping() {
        let original = "a\"b\\c\nd";
        let bindings = vec![("json".to_string(), json!({ "s": original }))];
        let result = evaluator().evaluate("json.s", bindings).await.unwrap();
        assert_eq!(result, json!(original));
    }

    #[tokio::test]
    async fn lua_truthiness_not_javascript_truthiness() {
        let eval = evaluator();
        assert!(eval.evaluate_bool("0", vec![]).await.unwrap());
        assert!(eval.evaluate_bool("\"\"", vec![]).await.unwrap());
        assert!(!eval.evaluate_bool("nil", vec![]).await.unwrap());
        assert!(!eval.evaluate_bool("false", vec![]).await.unwrap());
        assert!(!eval.evaluate_bool("1 == 2", vec![]).await.unwrap());
    }

    #[tokio::test]
    async fn indexing_nil_reports_a_lua_error() {
        let bindings = vec![("json".to_string(), json!({}))];
        let err = evaluator()
            .evaluate("json.missing.deep", bindings)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("attempt to index a nil value"));
    }

    #[tokio::test]
    async fn infinite_loop_hits_the_budget() {
        let err = LuaEvaluator::new(50)
            .evaluate("while true do end", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::BudgetExceeded(50)));
    }

    #[tokio::test]
    async fn cyclic_table_trips_the_depth_cap() {
        let err = evaluator()
            .evaluate("local t = {}\nt.self = t\nreturn t", vec![])
            .await
            .unwrap_err();
        assert!(matches!(&err, ScriptError::Eval(msg) if msg.contains("maximum depth")));
    }

    #[tokio::test]
    async fn deeply_nested_table_trips_the_depth_cap() {
        let err = evaluator()
            .evaluate(
                "local t = {}\nfor _ = 1, 200 do t = { inner = t } end\nreturn t",
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(&err, ScriptError::Eval(msg) if msg.contains("maximum depth")));
    }

    #[tokio::test]
    async fn deeply_nested_binding_trips_the_depth_cap() {
        let mut value = Value::from(0);
        for _ in 0..200 {
            let mut wrapper = Map::new();
            wrapper.insert("inner".to_string(), value);
            value = Value::Object(wrapper);
        }

        let err = evaluator()
            .evaluate("json.inner", vec![("json".to_string(), value)])
            .await
            .unwrap_err();
        assert!(matches!(&err, ScriptError::Eval(msg) if msg.contains("maximum depth")));
    }

    #[tokio::test]
    async fn sandbox_scrubs_dangerous_globals() {
        let clean = evaluator()
            .evaluate_bool("os == nil and io == nil and debug == nil and package == nil", vec![])
            .await
            .unwrap();
        assert!(clean);
    }

    #[tokio::test]
    async fn time_helpers_are_installed() {
        let eval = evaluator();
        let stamp = eval.evaluate("now()", vec![]).await.unwrap();
        assert!(matches!(&stamp, Value::String(s) if !s.is_empty()));
        let seconds = eval.evaluate("time()", vec![]).await.unwrap();
        assert!(seconds.as_i64().unwrap() > 0);
    }

    #[test]
    fn array_and_nested_literals_render() {
        let literal = json_to_lua_literal(&json!({ "items": [1, true, "x"] })).unwrap();
        assert_eq!(literal, "{[\"items\"] = {1, true, \"x\"}}");
    }
}
