//! Built-in console commands: `help`, `stop` and `permission`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::argument::{ArgValue, ParamType};
use super::context::{CommandContext, HandlerError};
use super::definition::{Command, CommandOwner};
use super::registry::CommandRegistry;
use super::signature::{CommandDeclarationError, CommandSignature};
use crate::permission::{Permission, PermissionService, PermitteeId};

/// Handles to the built-in commands after registration.
pub struct BuiltinCommands {
    pub help: Arc<Command>,
    pub stop: Arc<Command>,
    pub permission: Arc<Command>,
}

/// Build the built-in commands under `owner` and register them.
///
/// `stop` sets `stop_flag`; the console loop polls it. Commands whose names
/// are already taken are built but not registered.
pub fn register_builtin_commands(
    registry: &Arc<CommandRegistry>,
    permissions: &Arc<PermissionService>,
    owner: &CommandOwner,
    stop_flag: Arc<AtomicBool>,
) -> Result<BuiltinCommands, CommandDeclarationError> {
    let builtins = BuiltinCommands {
        help: Arc::new(help_command(owner, permissions, Arc::downgrade(registry))?),
        stop: Arc::new(stop_command(owner, permissions, stop_flag)?),
        permission: Arc::new(permission_command(owner, permissions)?),
    };
    for command in [&builtins.help, &builtins.stop, &builtins.permission] {
        if !registry.register_command(Arc::clone(command), false) {
            tracing::warn!(command = %command.primary_name(), "built-in command name taken");
        }
    }
    Ok(builtins)
}

// ============================================================================
// help / stop
// ============================================================================

fn help_command(
    owner: &CommandOwner,
    permissions: &Arc<PermissionService>,
    registry: Weak<CommandRegistry>,
) -> Result<Command, CommandDeclarationError> {
    let service = Arc::clone(permissions);
    Command::simple(owner, "help")
        .description("Show the usage of every command you may run")
        .overload(CommandSignature::builder().handle(move |ctx| {
            let text = help_text(&ctx, &service, &registry);
            async move {
                ctx.reply(text).await?;
                Ok(())
            }
        })?)
        .build(permissions)
}

fn help_text(
    ctx: &CommandContext,
    permissions: &PermissionService,
    registry: &Weak<CommandRegistry>,
) -> String {
    let Some(registry) = registry.upgrade() else {
        return String::new();
    };
    let permittee = ctx.sender().permittee_id();
    registry
        .all_registered_commands()
        .iter()
        .filter(|c| permissions.has_permission(permittee, c.permission().id()))
        .map(|c| {
            let usage = c.usage(registry.prefix());
            format!("◆ {}\n  {}", usage.replace('\n', "\n  "), c.description())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn stop_command(
    owner: &CommandOwner,
    permissions: &Arc<PermissionService>,
    stop_flag: Arc<AtomicBool>,
) -> Result<Command, CommandDeclarationError> {
    Command::simple(owner, "stop")
        .secondary_names(&["shutdown", "exit"])
        .description("Stop the console")
        .overload(CommandSignature::builder().handle(move |ctx| {
            stop_flag.store(true, Ordering::SeqCst);
            async move {
                ctx.reply("Stopping.").await?;
                Ok(())
            }
        })?)
        .build(permissions)
}

// ============================================================================
// permission
// ============================================================================

fn permittee_arg(ctx: &CommandContext, name: &str) -> Result<PermitteeId, HandlerError> {
    match ctx.arg(name)? {
        ArgValue::Null => Ok(ctx.sender().permittee_id()),
        other => other
            .as_permittee()
            .ok_or_else(|| HandlerError::failed(format!("'{}' is not a permittee", name))),
    }
}

fn permission_arg(ctx: &CommandContext, name: &str) -> Result<Permission, HandlerError> {
    ctx.arg(name)?
        .as_permission()
        .cloned()
        .ok_or_else(|| HandlerError::failed(format!("'{}' is not a permission", name)))
}

/// `permission permit|cancel|cancelAll <target> <permission>`
fn grant_like(
    service: &Arc<PermissionService>,
    apply: fn(&PermissionService, PermitteeId, &Permission) -> Result<(), crate::permission::PermissionError>,
) -> Result<CommandSignature, CommandDeclarationError> {
    let service = Arc::clone(service);
    CommandSignature::builder()
        .param("target", ParamType::PermitteeId)
        .param("permission", ParamType::Permission)
        .handle(move |ctx| {
            let outcome = permittee_arg(&ctx, "target").and_then(|target| {
                let permission = permission_arg(&ctx, "permission")?;
                apply(&service, target, &permission)
                    .map_err(|e| HandlerError::illegal_argument(e.to_string()))
            });
            async move {
                outcome?;
                ctx.reply("OK").await?;
                Ok(())
            }
        })
}

fn permission_command(
    owner: &CommandOwner,
    permissions: &Arc<PermissionService>,
) -> Result<Command, CommandDeclarationError> {
    let permitted = Arc::clone(permissions);
    let listed = Arc::clone(permissions);

    Command::composite(owner, "permission")
        .secondary_names(&["perm"])
        .description("Manage permissions")
        .sub_command(
            &["permit", "grant", "add"],
            grant_like(permissions, |svc, target, permission| {
                svc.grant(target, permission.id())
            })?,
        )
        .sub_command(
            &["cancel", "deny", "remove"],
            grant_like(permissions, |svc, target, permission| {
                svc.cancel(target, permission.id(), false)
            })?,
        )
        .sub_command(
            &["cancelAll", "denyAll", "removeAll"],
            grant_like(permissions, |svc, target, permission| {
                svc.cancel(target, permission.id(), true)
            })?,
        )
        .sub_command(
            &["permittedPermissions", "pp", "grantedPermissions", "gp"],
            CommandSignature::builder()
                .nullable("target", ParamType::PermitteeId)
                .handle(move |ctx| {
                    let text = permittee_arg(&ctx, "target").map(|target| {
                        let lines: Vec<String> = permitted
                            .permitted_permissions_with_source(target)
                            .into_iter()
                            .map(|(source, p)| format!("{} (granted to {})", p.id(), source))
                            .collect();
                        if lines.is_empty() {
                            format!("{} has no permissions", target)
                        } else {
                            lines.join("\n")
                        }
                    });
                    async move {
                        ctx.reply(text?).await?;
                        Ok(())
                    }
                })?,
        )
        .sub_command(
            &["listPermissions", "lp"],
            CommandSignature::builder().handle(move |ctx| {
                let text = listed
                    .registered_permissions()
                    .iter()
                    .map(|p| format!("{}    {}", p.id(), p.description()))
                    .collect::<Vec<_>>()
                    .join("\n");
                async move {
                    ctx.reply(text).await?;
                    Ok(())
                }
            })?,
        )
        .build(permissions)
}
