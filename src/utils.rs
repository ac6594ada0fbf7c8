//! 日志与 panic 钩子。

/// 写一行到浏览器控制台；原生目标（单元测试）下不输出。
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => {
        $crate::utils::log(&format!($($t)*))
    };
}

pub fn log(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::log_1(&message.into());
    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}

pub fn set_panic_hook() {
    // panic 信息输出到控制台，便于调试。
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
