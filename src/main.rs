#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_time::Delay;
use {defmt_rtt as _, panic_probe as _};

use kos_daq::{
    drivers::create_default_imu,
    ipc,
    protocol::Framer,
    tasks::{acquisition_task, command_task},
    Board,
};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting kos-daq data acquisition firmware");
    let board = match Board::init() {
        Ok(board) => board,
        Err(e) => {
            error!("Board initialization failed: {:?}", e);
            return;
        }
    };

    match create_default_imu(board.i2c, Delay).await {
        Ok(imu) => {
            info!("IMU configured");
            if let Err(e) = spawner.spawn(acquisition_task(imu, board.uart_tx, board.aux)) {
                error!("Failed to spawn acquisition task: {:?}", e);
                return;
            }
            if let Err(e) = spawner.spawn(command_task(board.uart_rx)) {
                error!("Failed to spawn command task: {:?}", e);
            }
        }
        Err(e) => {
            error!("IMU initialization failed: {:?}", e);
            // Report the cause to the host, then fail-stop
            let mut framer = Framer::new(board.uart_tx);
            if let Err(e) = framer.send_error_code(e.code()).await {
                warn!("Could not send error code: {:?}", e);
            }
            let _ = framer.fail().await;
            ipc::halt();
        }
    }

    core::future::pending::<()>().await;
}
