//! End-to-end command dispatch: config grants, built-in commands and a
//! plugin-style composite command run through one executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mochi_core::command::{
    ArgValue, CollectingSender, Command, CommandExecuteResult, CommandExecuteStatus,
    CommandExecutor, CommandOwner, CommandRegistry, CommandSignature, FailureReason, ParamType,
    SenderKind, register_builtin_commands,
};
use mochi_core::config::Config;
use mochi_core::permission::{PermissionService, PermitteeId};

struct Bot {
    executor: CommandExecutor,
    stop: Arc<AtomicBool>,
}

fn bot(config: &str) -> Bot {
    let config = Config::parse(config).unwrap();
    let permissions = Arc::new(PermissionService::new());
    let registry = Arc::new(CommandRegistry::new(config.command_prefix.clone()));
    let console = CommandOwner::new(&config.console.owner_namespace, &permissions).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    register_builtin_commands(&registry, &permissions, &console, Arc::clone(&stop)).unwrap();

    let plugin = CommandOwner::new("calc", &permissions).unwrap();
    let calc = Command::composite(&plugin, "calc")
        .description("Integer arithmetic")
        .sub_command(
            &["add", "plus"],
            CommandSignature::builder()
                .param("a", ParamType::Int)
                .param("b", ParamType::Int)
                .handle(|ctx| async move {
                    let a = ctx.arg("a")?.as_int().unwrap_or_default();
                    let b = ctx.arg("b")?.as_int().unwrap_or_default();
                    ctx.reply(format!("{}", a + b)).await?;
                    Ok(())
                })
                .unwrap(),
        )
        .sub_command(
            &["sum"],
            CommandSignature::builder()
                .vararg("values", ParamType::Long)
                .handle(|ctx| async move {
                    let total: i64 = ctx
                        .arg("values")?
                        .as_vararg()
                        .unwrap_or_default()
                        .iter()
                        .filter_map(ArgValue::as_long)
                        .sum();
                    ctx.reply(total.to_string()).await?;
                    Ok(())
                })
                .unwrap(),
        )
        .build(&permissions)
        .unwrap();
    assert!(registry.register_command(Arc::new(calc), false));

    config.apply_grants(&permissions).unwrap();
    Bot {
        executor: CommandExecutor::new(registry, permissions),
        stop,
    }
}

fn member(group: u64, id: u64) -> Arc<CollectingSender> {
    Arc::new(CollectingSender::new(
        SenderKind::Member,
        PermitteeId::ExactMember(group, id),
    ))
}

#[tokio::test]
async fn test_config_grants_gate_plugin_commands() {
    let bot = bot(
        r#"
command_prefix = "!"

[permissions.grants]
"calc:*" = ["m100.*"]
"#,
    );

    let allowed = member(100, 1);
    let result = bot
        .executor
        .execute_command(allowed.clone(), "!calc add 2 40", true)
        .await;
    assert!(result.is_success(), "{:?}", result);
    assert_eq!(allowed.transcript(), "42");

    let other_group = member(200, 1);
    let result = bot
        .executor
        .execute_command(other_group.clone(), "!calc add 2 40", true)
        .await;
    assert_eq!(result.status(), CommandExecuteStatus::PermissionDenied);
    assert!(other_group.messages().is_empty());

    // the default prefix is not the configured one
    let result = bot
        .executor
        .execute_command(allowed, "/calc add 1 1", true)
        .await;
    assert_eq!(result.status(), CommandExecuteStatus::UnresolvedCommand);
}

#[tokio::test]
async fn test_sub_command_aliases_and_varargs() {
    let bot = bot("");
    let console = Arc::new(CollectingSender::console());
    for line in ["/calc plus 1 2", "/CALC sum 10 20 30", "/calc sum"] {
        let result = bot.executor.execute_command(console.clone(), line, true).await;
        assert!(result.is_success(), "{}: {:?}", line, result);
    }
    assert_eq!(console.transcript(), "3\n60\n0");
}

#[tokio::test]
async fn test_failures_are_values() {
    let bot = bot("");
    let console = Arc::new(CollectingSender::console());

    let result = bot
        .executor
        .execute_command(console.clone(), "/calc add 1", true)
        .await;
    match &result {
        CommandExecuteResult::UnmatchedSignature { failures, .. } => {
            assert!(failures
                .iter()
                .any(|f| matches!(f.reason, FailureReason::NotEnoughArguments)));
        }
        other => panic!("expected unmatched signature, got {:?}", other),
    }
    let text = result.describe("/").unwrap();
    assert!(text.starts_with("No overload of calc matches"), "{}", text);

    let result = bot
        .executor
        .execute_command(console.clone(), "/calc add one 2", true)
        .await;
    assert_eq!(result.status(), CommandExecuteStatus::IllegalArgument);

    let result = bot.executor.execute_command(console, "/nothing", true).await;
    assert_eq!(
        result.describe("/").as_deref(),
        Some("Unknown command: nothing")
    );
}

#[tokio::test]
async fn test_console_session_with_builtins() {
    let bot = bot("");
    let console = Arc::new(CollectingSender::console());
    let lines = [
        "/permission permit u7 calc:*",
        "/perm pp u7",
        "/stop",
    ];
    for line in lines {
        let result = bot.executor.execute_command(console.clone(), line, true).await;
        assert!(result.is_success(), "{}: {:?}", line, result);
    }
    let transcript = console.transcript();
    assert!(transcript.starts_with("OK\n"), "{}", transcript);
    assert!(transcript.contains("calc:* (granted to u7)"), "{}", transcript);
    assert!(bot.stop.load(Ordering::SeqCst));

    let friend = Arc::new(CollectingSender::new(
        SenderKind::Friend,
        PermitteeId::ExactFriend(7),
    ));
    let result = bot
        .executor
        .execute_command(friend.clone(), "/calc add 1 2", true)
        .await;
    assert!(result.is_success(), "{:?}", result);
    assert_eq!(friend.transcript(), "3");
}
