use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// 任务每次迭代后的走向
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStep<R> {
    /// 继续下一次迭代
    Continue,
    /// 结束循环，并带出结束原因
    Break(R),
}

/// 循环结束的方式
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit<R> {
    /// 外部调用了 `stop`
    Stopped,
    /// 任务主动结束
    Finished(R),
    /// 任务发生了panic，携带panic信息
    Panicked(String),
}

/// 交给任务的运行标志，任务可以在耗时操作之前检查是否已被要求停止
#[derive(Debug, Clone)]
pub struct LoopToken {
    running: Arc<AtomicBool>,
}

impl LoopToken {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// 在循环线程上运行的任务
pub trait LoopTask: Send + 'static {
    /// 结束原因
    type Exit: Send + 'static;

    /// 执行一次迭代
    fn step(&mut self, token: &LoopToken) -> LoopStep<Self::Exit>;

    /// 循环结束后在同一个线程上调用一次，无论循环以何种方式结束
    fn finish(self, exit: LoopExit<Self::Exit>);
}

/// 循环控制结构体
///
/// 在独立线程上反复执行任务的 `step`，直到它返回 `Break`、发生panic或外部调用 `stop`，
/// 最后调用任务的 `finish`。
pub struct MultiLoop {
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MultiLoop {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// 启动循环
    ///
    /// # 参数
    /// * `name` - 线程名
    /// * `interval` - 每次迭代之间的间隔
    /// * `task` - 循环执行的任务
    pub fn start<T: LoopTask>(&mut self, name: &str, interval: Duration, mut task: T) -> io::Result<()> {
        if self.is_running() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "loop is already running"));
        }
        // 上一次的线程可能还在收尾，先等它结束
        self.join();
        self.running.store(true, Ordering::Release);

        let token = LoopToken {
            running: Arc::clone(&self.running),
        };
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let exit = loop {
                if !token.is_running() {
                    break LoopExit::Stopped;
                }
                match panic::catch_unwind(AssertUnwindSafe(|| task.step(&token))) {
                    Ok(LoopStep::Continue) => {}
                    Ok(LoopStep::Break(reason)) => break LoopExit::Finished(reason),
                    Err(payload) => break LoopExit::Panicked(panic_message(payload.as_ref())),
                }
                // 控制处理频率
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            };
            token.running.store(false, Ordering::Release);
            task.finish(exit);
        });

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// 请求停止循环，不等待线程结束
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 等待线程结束（包括 `finish`）
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("循环线程在收尾阶段panic");
            }
        }
    }
}

impl Default for MultiLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MultiLoop {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 执行 `limit` 次后结束的任务，`limit` 为 `None` 时一直运行
    struct Counter {
        count: usize,
        limit: Option<usize>,
        panic_at: Option<usize>,
        exits: Arc<Mutex<Vec<LoopExit<usize>>>>,
    }

    impl Counter {
        fn new(limit: Option<usize>) -> (Self, Arc<Mutex<Vec<LoopExit<usize>>>>) {
            let exits = Arc::new(Mutex::new(Vec::new()));
            let task = Self {
                count: 0,
                limit,
                panic_at: None,
                exits: Arc::clone(&exits),
            };
            (task, exits)
        }
    }

    impl LoopTask for Counter {
        type Exit = usize;

        fn step(&mut self, _token: &LoopToken) -> LoopStep<usize> {
            self.count += 1;
            if self.panic_at == Some(self.count) {
                panic!("boom");
            }
            match self.limit {
                Some(limit) if self.count >= limit => LoopStep::Break(self.count),
                _ => LoopStep::Continue,
            }
        }

        fn finish(self, exit: LoopExit<usize>) {
            self.exits.lock().unwrap().push(exit);
        }
    }

    #[test]
    fn test_task_break_reports_finished() {
        let (task, exits) = Counter::new(Some(5));
        let mut muloop = MultiLoop::new();
        muloop.start("count", Duration::ZERO, task).unwrap();
        muloop.join();

        assert_eq!(*exits.lock().unwrap(), vec![LoopExit::Finished(5)]);
        assert!(!muloop.is_running());
    }

    #[test]
    fn test_stop_reports_stopped() {
        let (task, exits) = Counter::new(None);
        let mut muloop = MultiLoop::new();
        muloop.start("continuous", Duration::from_millis(5), task).unwrap();
        thread::sleep(Duration::from_millis(30));
        muloop.stop();
        muloop.join();

        assert_eq!(*exits.lock().unwrap(), vec![LoopExit::Stopped]);
    }

    #[test]
    fn test_panic_is_caught_and_task_finishes() {
        let (mut task, exits) = Counter::new(None);
        task.panic_at = Some(3);
        let mut muloop = MultiLoop::new();
        muloop.start("panicky", Duration::ZERO, task).unwrap();
        muloop.join();

        assert_eq!(*exits.lock().unwrap(), vec![LoopExit::Panicked("boom".to_string())]);
    }

    #[test]
    fn test_second_start_while_running_is_rejected() {
        let (first, _) = Counter::new(None);
        let (second, _) = Counter::new(None);
        let mut muloop = MultiLoop::new();
        muloop.start("first", Duration::from_millis(5), first).unwrap();
        let err = muloop.start("second", Duration::ZERO, second).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        muloop.stop();
        muloop.join();
    }

    #[test]
    fn test_restart_after_finish() {
        let mut muloop = MultiLoop::new();
        let mut all = Vec::new();
        for _ in 0..3 {
            let (task, exits) = Counter::new(Some(1));
            muloop.start("restart", Duration::ZERO, task).unwrap();
            muloop.join();
            all.extend(exits.lock().unwrap().drain(..));
        }
        assert_eq!(all, vec![LoopExit::Finished(1); 3]);
    }

    #[test]
    fn test_drop_stops_thread() {
        let (task, exits) = Counter::new(None);
        {
            let mut muloop = MultiLoop::new();
            muloop.start("dropped", Duration::from_millis(1), task).unwrap();
        }
        assert_eq!(*exits.lock().unwrap(), vec![LoopExit::Stopped]);
    }
}
