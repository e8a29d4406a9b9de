//! Demo thinks wired into the console
//!
//!   main     root menu, echoes anything it does not understand
//!   weather  one-shot answer, reached by "weather in <city>"
//!   survey   two-step form that depends on `ask` for the name
//!   counter  long-term counter, vars survive the task
//!   /remind  reaction scheduling an async input

use ghost_core::{Message, Result, Url};
use ghost_engine::{
    Context, FnStage, Focus, Intention, Mind, Mindset, Reaction, Signal, StageResult, StageThink,
    Target, TaskOptions,
};
use ghost_runtime::{Task, TaskLevel};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const HELP: &str = "Try: /help, weather in <city>, /survey, /count, /remind <what>, \
                    /cancel, /restart, /rewind, /quit";

pub fn mindset() -> Mindset {
    Mindset::new()
        .with_think(menu())
        .with_think(weather())
        .with_think(survey())
        .with_think(ask())
        .with_think(counter())
}

pub fn focus() -> Focus {
    let mut focus = Focus::with_default_drivers();
    for (name, signal) in [
        ("quit", Signal::Quit),
        ("cancel", Signal::Cancel),
        ("restart", Signal::Restart),
        ("rewind", Signal::Rewind),
    ] {
        focus.register_global_intention(Intention::command(name, Target::Signal(signal)));
    }
    focus.register_global_intention(Intention::regex(
        "weather",
        r"(?i)^weather in (?P<city>[\w ]+)$",
        Target::Think(Url::new("weather")),
    ));
    focus
}

/// Root think. Public, so its attentions stay live under other tasks.
fn menu() -> StageThink {
    StageThink::new("main")
        .with_options(TaskOptions {
            level: TaskLevel::Public,
            ..TaskOptions::default()
        })
        .with_attention(Intention::command("survey", Target::Think(Url::new("survey"))))
        .with_attention(Intention::command("count", Target::Think(Url::new("counter"))))
        .with_stage(
            FnStage::new("start")
                .with_reaction(Arc::new(Help))
                .with_reaction(Arc::new(Remind))
                .activating(|ctx, this| {
                    ctx.send_at(this).text(format!("Hi, I'm a ghost. {}", HELP));
                    Ok(Some(Mind::new(this).awaits()))
                })
                .received(|ctx, this| {
                    let text = ctx.text().unwrap_or_default();
                    let reply = if ctx.input().is_async {
                        format!("Reminder: {}", text)
                    } else {
                        format!("You said: {}", text)
                    };
                    ctx.send_at(this).text(reply);
                    Ok(Some(Mind::new(this).awaits()))
                })
                .preempted(|ctx, this| {
                    ctx.send_at(this).text("Back at the main menu.");
                    Ok(Some(Mind::new(this).awaits()))
                })
                .canceling(|ctx, this| {
                    ctx.send_at(this).text("Canceled.");
                    Ok(Some(Mind::new(this).awaits()))
                })
                .quitting(|ctx, this| {
                    ctx.send_at(this).text("Bye.");
                    Ok(None)
                })
                .failed(|ctx, this, reason| {
                    tracing::warn!(tid = %this.tid, "Demo recovered from failure: {}", reason);
                    ctx.send_at(this).text("Something broke, back at the main menu.");
                    Ok(Some(Mind::new(this).awaits()))
                }),
        )
}

struct Help;

impl Reaction for Help {
    fn name(&self) -> &str {
        "help"
    }

    fn react(
        &self,
        ctx: &mut Context<'_>,
        this: &mut Task,
        _args: &Map<String, Value>,
    ) -> StageResult {
        ctx.send_at(this).text(HELP);
        Ok(None)
    }
}

/// `/remind buy milk` comes back as an async input after the turn.
struct Remind;

impl Reaction for Remind {
    fn name(&self) -> &str {
        "remind"
    }

    fn react(
        &self,
        ctx: &mut Context<'_>,
        this: &mut Task,
        args: &Map<String, Value>,
    ) -> StageResult {
        let what = args
            .get("args")
            .and_then(Value::as_array)
            .map(|words| {
                words
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|w| !w.is_empty())
            .unwrap_or_else(|| "something".to_string());
        ctx.async_input(Message::text(what.clone()), None);
        ctx.send_at(this).text(format!("I'll remind you about {}.", what));
        Ok(None)
    }
}

fn weather() -> StageThink {
    StageThink::new("weather").with_stage(FnStage::new("start").activating(|ctx, this| {
        let city = this
            .vars_as::<Map<String, Value>>()
            .and_then(|vars| vars.get("city").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "nowhere".to_string());
        ctx.send_at(this)
            .text(format!("It's always sunny in {}.", city.trim()));
        Ok(Some(Mind::new(this).finish(json!({ "city": city }))))
    }))
}

fn survey() -> StageThink {
    StageThink::new("survey")
        .with_vars(json!({}))
        .with_stage(
            FnStage::new("start")
                .activating(|_ctx, this| Ok(Some(Mind::new(this).depend_on("ask"))))
                .callback(|_ctx, this, _from, result| {
                    set_var(this, "name", result.get("name").cloned().unwrap_or(Value::Null));
                    Ok(Some(Mind::new(this).forward(["color"])))
                }),
        )
        .with_stage(
            FnStage::new("color")
                .activating(|ctx, this| {
                    ctx.send_at(this).text("Favourite colour?");
                    Ok(Some(Mind::new(this).awaits()))
                })
                .received(|ctx, this| {
                    let color = ctx.text().unwrap_or_default().to_string();
                    set_var(this, "color", Value::String(color));
                    let vars = this.vars.clone().unwrap_or(Value::Null);
                    ctx.send_at(this).text(format!(
                        "Thanks {}, noted {}.",
                        vars["name"].as_str().unwrap_or("stranger"),
                        vars["color"].as_str().unwrap_or("nothing")
                    ));
                    Ok(Some(Mind::new(this).finish(vars)))
                }),
        )
}

fn ask() -> StageThink {
    StageThink::new("ask").with_stage(
        FnStage::new("start")
            .activating(|ctx, this| {
                ctx.send_at(this).text("What's your name?");
                Ok(Some(Mind::new(this).awaits()))
            })
            .received(|ctx, this| {
                let name = ctx.text().unwrap_or_default().trim().to_string();
                Ok(Some(Mind::new(this).finish(json!({ "name": name }))))
            }),
    )
}

fn counter() -> StageThink {
    StageThink::new("counter")
        .with_options(TaskOptions {
            long_term: true,
            overdue: 7 * 24 * 3_600,
            ..TaskOptions::default()
        })
        .with_stage(
            FnStage::new("start")
                .activating(|ctx, this| {
                    let count = bump(this)?;
                    ctx.send_at(this).text(format!(
                        "Count is {}. Send + to bump, anything else to leave.",
                        count
                    ));
                    Ok(Some(Mind::new(this).awaits()))
                })
                .received(|ctx, this| {
                    if ctx.text().map(str::trim) != Some("+") {
                        return Ok(Some(Mind::new(this).finish(Value::Null)));
                    }
                    let count = bump(this)?;
                    ctx.send_at(this).text(format!("Count is {}.", count));
                    Ok(Some(Mind::new(this).awaits()))
                }),
        )
}

fn bump(task: &mut Task) -> Result<u64> {
    let count = task.vars_as::<Map<String, Value>>().and_then(|v| v.get("count")?.as_u64());
    let count = count.unwrap_or(0) + 1;
    task.set_vars(&json!({ "count": count }))?;
    Ok(count)
}

fn set_var(task: &mut Task, key: &str, value: Value) {
    match task.vars.as_mut().and_then(Value::as_object_mut) {
        Some(vars) => {
            vars.insert(key.to_string(), value);
        }
        None => {
            let mut vars = Map::new();
            vars.insert(key.to_string(), value);
            task.vars = Some(Value::Object(vars));
        }
    }
}
