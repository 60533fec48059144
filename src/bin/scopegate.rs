use scopegate::permission::{ObjectRef, RequestedTarget};
use scopegate::role::{Principal, Role, RoleDraft};
use scopegate::{resolve, resolve_user_permissions};
use std::fs;
use std::path::Path;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32, String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "resolve" => cmd_resolve(&args[2..]),
        "user" => cmd_user(&args[2..]),
        "check-role" => cmd_check_role(&args[2..]),
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

fn cmd_resolve(args: &[String]) -> Result<i32, String> {
    let principal = load_principal(args)?;
    let schema = parse_flag_value(args, "--schema").map(str::to_string);
    let object = match (
        parse_flag_value(args, "--table"),
        parse_flag_value(args, "--view"),
    ) {
        (Some(_), Some(_)) => return Err("--table and --view are mutually exclusive".into()),
        (Some(table), None) => Some(ObjectRef::table(table)),
        (None, Some(view)) => Some(ObjectRef::view(view)),
        (None, None) => None,
    };
    let target = RequestedTarget::from_parts(schema, object).map_err(|e| e.to_string())?;
    print_json(&resolve(&principal, &target))?;
    Ok(0)
}

fn cmd_user(args: &[String]) -> Result<i32, String> {
    let principal = load_principal(args)?;
    print_json(&resolve_user_permissions(&principal))?;
    Ok(0)
}

fn cmd_check_role(args: &[String]) -> Result<i32, String> {
    let path = parse_flag_value(args, "--role").ok_or("--role is required")?;
    let draft: RoleDraft = read_json(Path::new(path))?;
    let existing: Option<Role> = match parse_flag_value(args, "--existing") {
        Some(path) => Some(read_json(Path::new(path))?),
        None => None,
    };
    match draft.validate(existing.as_ref()) {
        Ok(grants) => {
            println!("ok\t{} grants", grants.len());
            Ok(0)
        }
        Err(errors) => {
            for err in &errors.0 {
                println!("{}\t{}\t{}", err.field, err.code, err.message);
            }
            Ok(1)
        }
    }
}

fn load_principal(args: &[String]) -> Result<Principal, String> {
    let path = parse_flag_value(args, "--principal").ok_or("--principal is required")?;
    read_json(Path::new(path))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let bytes = fs::read(path).map_err(|e| format!("read {}: {e}", path.display()))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("decode {}: {e}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| format!("encode: {e}"))?;
    println!("{out}");
    Ok(())
}

fn parse_flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|pair| pair[0] == flag)
        .map(|pair| pair[1].as_str())
}

fn print_usage() {
    eprintln!(
        "usage:\n  \
         scopegate resolve --principal <file> [--schema <name>] [--table <name> | --view <name>]\n  \
         scopegate user --principal <file>\n  \
         scopegate check-role --role <file> [--existing <file>]"
    );
}
