use std::{
    io,
    net::{SocketAddr, TcpListener, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread,
    time::Duration,
};

use log::{info, warn};

use crate::error::Error;

use super::{Credentials, Handler, Session, ThreadPool};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// TCP front-end serving each connection on a worker of a fixed pool.
///
/// `factory` builds a fresh handler per connection.
pub struct Server<F> {
    listener: TcpListener,
    credentials: Arc<Credentials>,
    factory: Arc<F>,
    pool: ThreadPool,
    running: Arc<AtomicBool>,
    next_connection_id: AtomicU32,
}

impl<H, F> Server<F>
where
    H: Handler + 'static,
    F: Fn() -> H + Send + Sync + 'static,
{
    pub fn bind(
        address: impl ToSocketAddrs,
        credentials: Credentials,
        workers: usize,
        factory: F,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            credentials: Arc::new(credentials),
            factory: Arc::new(factory),
            pool: ThreadPool::new(workers),
            running: Arc::new(AtomicBool::new(true)),
            next_connection_id: AtomicU32::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Clearing this flag makes [`Server::listen`] return.
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Accepts connections until the running flag is cleared.
    pub fn listen(&self) -> Result<(), Error> {
        info!(
            "listening at {} with {} workers",
            self.local_addr()?,
            self.pool.size()
        );

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("set_nodelay failed for {peer}: {e}");
                    }

                    let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
                    info!("accepted connection {id} from {peer}");

                    let credentials = Arc::clone(&self.credentials);
                    let factory = Arc::clone(&self.factory);
                    self.pool.execute(move || {
                        match Session::accept(stream, factory(), &credentials, id) {
                            Ok(mut session) => {
                                if let Err(e) = session.run() {
                                    warn!("connection {id} ended: {e}");
                                }
                            }
                            Err(e) => warn!("connection {id} rejected: {e}"),
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }

        info!("listener stopped");
        Ok(())
    }
}
