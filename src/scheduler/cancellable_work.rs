use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};

use pin_project_lite::pin_project;

use super::TaskHandle;

pin_project! {
  /// A future that is skipped entirely when its handle gets cancelled before
  /// the executor first polls it. The first poll claims the handle, after
  /// which cancelling has no effect.
  pub struct CancellableWork<F> {
    #[pin]
    future: F,
    handle: TaskHandle,
  }
}

impl<F> CancellableWork<F> {
  pub fn new(future: F, handle: TaskHandle) -> Self { Self { future, handle } }
}

impl<F: Future<Output = ()>> Future for CancellableWork<F> {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
    let this = self.project();
    if !this.handle.begin() {
      return Poll::Ready(());
    }
    let res = this.future.poll(cx);
    if res.is_ready() {
      this.handle.mark_finished();
    }
    res
  }
}
