use embassy_executor::task;
use embassy_stm32::usart::RingBufferedUartRx;

use crate::command::LineBuffer;
use crate::config::MAX_COMMAND_LEN;
use crate::ipc::{self, COMMAND_CH};

#[task]
pub async fn command_task(mut rx: RingBufferedUartRx<'static>) {
    info!("Command task started");
    let mut lines = LineBuffer::<MAX_COMMAND_LEN>::new();
    let mut buf = [0u8; 32];

    while !ipc::is_halted() {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                // Overrun or framing error; the ring buffer restarts on the next read
                warn!("UART RX error: {:?}", e);
                continue;
            }
        };
        for &byte in &buf[..n] {
            match lines.push(byte) {
                Some(Ok(line)) => COMMAND_CH.send(line).await,
                Some(Err(e)) => warn!("Dropped command line: {:?}", e),
                None => {}
            }
        }
    }

    info!("Command task parked after fail-stop");
    core::future::pending::<()>().await;
}
