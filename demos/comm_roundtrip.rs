//! Two comm managers talking over an in-process transport pair.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use xcomm::{
    ChannelConfig, ChannelFrameTransport, CommConfig, CommData, CommManager, CommRegistry,
    Session, callback,
};

fn data(value: serde_json::Value) -> CommData {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ChannelConfig::default().with_read_timeout(Duration::from_millis(100));
    let (t1, t2) = ChannelFrameTransport::create_pair("demo", config)?;
    let kernel_session = Arc::new(Session::new(t1));
    let frontend_session = Arc::new(Session::new(t2));

    let kernel = Arc::new(CommManager::new(
        kernel_session.clone(),
        CommRegistry::new(),
    ));
    let frontend = Arc::new(CommManager::new(
        frontend_session.clone(),
        CommRegistry::new(),
    ));

    // The frontend echoes every message back on the same comm.
    frontend.register_target("echo", |comm, data| {
        println!("[frontend] opened {} with {:?}", comm.comm_id(), data);
        let weak = Arc::downgrade(comm);
        comm.on_msg(callback(move |data| {
            if let Some(comm) = weak.upgrade() {
                if let Err(e) = comm.send(Some(data.clone())) {
                    eprintln!("[frontend] echo failed: {}", e);
                }
            }
        }));
        comm.on_close(callback(|data| println!("[frontend] closed with {:?}", data)));
    });

    let kernel_loop = {
        let kernel = kernel.clone();
        let session = kernel_session.clone();
        tokio::spawn(async move { kernel.serve(&session).await })
    };
    let frontend_loop = {
        let frontend = frontend.clone();
        let session = frontend_session.clone();
        tokio::spawn(async move { frontend.serve(&session).await })
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let comm = kernel.new_comm(
        CommConfig::new()
            .with_target("echo")
            .with_open_data(data(json!({"greeting": "hello"})))
            .with_on_msg(move |data| {
                let _ = tx.send(data.clone());
            }),
    )?;

    for i in 0..3 {
        comm.send(Some(data(json!({"n": i}))))?;
        if let Ok(Some(echo)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            println!("[kernel] echo {:?}", echo);
        }
    }

    comm.close(Some(data(json!({"reason": "done"}))))?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    if let Some(stats) = kernel_session.stats() {
        print!("{}", stats);
    }

    kernel_session.close().await?;
    frontend_session.close().await?;
    kernel_loop.await??;
    frontend_loop.await??;
    Ok(())
}
