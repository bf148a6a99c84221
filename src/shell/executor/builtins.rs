use std::env;

use log::debug;
use once_cell::sync::Lazy;

use super::{EXIT_FAILURE, EXIT_SUCCESS};

/// 内建命令：`(argv, 上一条命令的返回值, 是否退出 shell)` -> 返回值
pub type Handler = fn(&[String], i32, &mut bool) -> i32;

pub struct Builtin {
    pub name: &'static str,
    pub handler: Handler,
}

// 进程启动后初始化一次，之后只读
static BUILTINS: Lazy<Vec<Builtin>> = Lazy::new(|| {
    vec![
        Builtin {
            name: "exit",
            handler: builtin_exit,
        },
        Builtin {
            name: "cd",
            handler: builtin_cd,
        },
        Builtin {
            name: "pwd",
            handler: builtin_pwd,
        },
        Builtin {
            name: "?",
            handler: builtin_last_status,
        },
    ]
});

/// 按名字精确匹配，第一个匹配的生效
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn builtin_exit(argv: &[String], last_rv: i32, should_exit: &mut bool) -> i32 {
    let code = match argv.get(1) {
        None => last_rv,
        Some(arg) => match arg.parse::<i32>() {
            Ok(code) => code,
            Err(_) => {
                eprintln!("exit: {}: numeric argument required", arg);
                return EXIT_FAILURE;
            }
        },
    };
    debug!("exit 内建命令，返回值 {}", code);
    *should_exit = true;
    code
}

fn builtin_cd(argv: &[String], _last_rv: i32, _should_exit: &mut bool) -> i32 {
    if argv.len() > 2 {
        eprintln!("cd: too many arguments");
        return EXIT_FAILURE;
    }
    let path = argv.get(1).map(String::as_str).unwrap_or("~");
    let path = shellexpand::tilde(path);
    match env::set_current_dir(&*path) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("cd: {}: {}", path, e);
            EXIT_FAILURE
        }
    }
}

fn builtin_pwd(_argv: &[String], _last_rv: i32, _should_exit: &mut bool) -> i32 {
    match env::current_dir() {
        Ok(dir) => {
            println!("{}", dir.display());
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("pwd: {}", e);
            EXIT_FAILURE
        }
    }
}

fn builtin_last_status(_argv: &[String], last_rv: i32, _should_exit: &mut bool) -> i32 {
    println!("{}", last_rv);
    EXIT_SUCCESS
}
