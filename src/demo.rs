//! Demonstration test library

use anyhow::Context as _;
use serde_json::json;
use std::time::Duration;

use unitrun::library::TestSuite;
use unitrun::models::EventKind;

pub fn library() -> TestSuite {
    let mut suite = TestSuite::new();

    suite
        .test("math/add", |ctx, args| {
            let a = args[0].as_i64().context("first argument must be an integer")?;
            let b = args[1].as_i64().context("second argument must be an integer")?;
            ctx.info("a", a).info("b", b);
            ctx.greater_eq(&(a + b), &a.min(b));
            Ok(Some(json!(a + b)))
        })
        .location(file!(), line!())
        .description("adds two integers")
        .arity(2)
        .pack(vec![json!(1), json!(2)])
        .pack(vec![json!(-4), json!(10)]);

    suite
        .test("math/divide", |ctx, args| {
            let a = args[0].as_f64().context("numerator must be a number")?;
            let b = args[1].as_f64().context("denominator must be a number")?;
            if !ctx.not_equal(&b, &0.0) {
                return Ok(None);
            }
            ctx.within(a / b * b, a, 1e-9);
            Ok(Some(json!(a / b)))
        })
        .location(file!(), line!())
        .arity(2)
        .pack(vec![json!(1.0), json!(3.0)])
        .pack(vec![json!(1.0), json!(0.0)]);

    suite
        .test("strings/upper", |ctx, _| {
            ctx.section("ascii", |ctx| ctx.equal("abc".to_uppercase().as_str(), "ABC"));
            ctx.section("unicode", |ctx| {
                ctx.at(file!(), line!())
                    .equal("straße".to_uppercase().as_str(), "STRASSE")
            });
            if ctx.count(EventKind::Failure) > 0 {
                ctx.comment("case mapping differs from the Unicode tables");
            }
            Ok(None)
        })
        .location(file!(), line!());

    suite
        .test("net/connect", |ctx, _| {
            ctx.comment("no network in the demo");
            ctx.skip("offline");
            Ok(None)
        })
        .location(file!(), line!());

    suite
        .test("net/latency", |ctx, _| {
            ctx.timed(|| std::thread::sleep(Duration::from_millis(25)));
            ctx.print_out("slept 25ms\n");
            Ok(None)
        })
        .location(file!(), line!());

    suite
        .test("parse/config", |_, _| {
            let value: serde_json::Value = serde_json::from_str("{not json")?;
            Ok(Some(value))
        })
        .location(file!(), line!())
        .description("raises an exception event");

    suite
}
